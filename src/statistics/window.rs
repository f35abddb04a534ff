//! Hourly aggregation windows
//!
//! A window is the half-open UTC interval `[start, end)` with `start` on an
//! hour boundary. The scheduler always compiles the most recently *completed*
//! hour so every raw measurement for it has already landed.

use chrono::{DateTime, Duration, Utc};

/// Width of one aggregation window in seconds
pub const WINDOW_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSpec {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl WindowSpec {
    /// Window containing `ts`, i.e. starting at `ts` truncated to the hour
    pub fn starting_at(ts: DateTime<Utc>) -> Self {
        let start = truncate_to_hour(ts);
        Self {
            start,
            end: start + Duration::seconds(WINDOW_SECS),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn start_timestamp(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_timestamp(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl std::fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Zero minutes, seconds and sub-second part
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = ts.timestamp().rem_euclid(WINDOW_SECS);
    ts - Duration::seconds(into_hour) - Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

/// Most recently completed hour relative to the wall clock
pub fn current_window() -> WindowSpec {
    current_window_at(Utc::now())
}

pub fn current_window_at(now: DateTime<Utc>) -> WindowSpec {
    WindowSpec::starting_at(now - Duration::seconds(WINDOW_SECS))
}
