//! Core statistics data structures

use super::window::WindowSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Relative slack allowed between `mean` and `[min, max]`; float averaging
/// can land a few ULPs outside the extremes of constant input
const MEAN_RELATIVE_TOLERANCE: f64 = 1e-9;

/// Aggregate for one entity over one window, as produced by a source
///
/// Each field is optional: a source that cannot supply e.g. a mean for an
/// entity still reports the extremes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl AggregateStats {
    pub fn new(mean: f64, min: f64, max: f64) -> Self {
        Self {
            mean: Some(mean),
            min: Some(min),
            max: Some(max),
        }
    }

    /// Reject shapes no correct aggregation can produce
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [("mean", self.mean), ("min", self.min), ("max", self.max)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(format!("{} is not finite ({})", field, v));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!("min {} exceeds max {}", min, max));
            }
            if let Some(mean) = self.mean {
                let slack = MEAN_RELATIVE_TOLERANCE * min.abs().max(max.abs());
                if mean < min - slack || mean > max + slack {
                    return Err(format!("mean {} outside [{}, {}]", mean, min, max));
                }
            }
        }

        Ok(())
    }
}

/// One source's output for one window: statistic_id -> aggregate
pub type SourceAggregateResult = HashMap<String, AggregateStats>;

/// Identifiers compare case-insensitively; lowercase is the stored form
pub fn normalize_statistic_id(statistic_id: &str) -> String {
    statistic_id.to_lowercase()
}

/// Persisted hourly aggregate, keyed by `(statistic_id, start)`
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticRecord {
    pub statistic_id: String,
    pub source: String,
    pub start: DateTime<Utc>,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StatisticRecord {
    pub fn from_stats(
        source: &str,
        statistic_id: &str,
        window: &WindowSpec,
        stats: &AggregateStats,
    ) -> Self {
        Self {
            statistic_id: normalize_statistic_id(statistic_id),
            source: source.to_string(),
            start: window.start(),
            mean: stats.mean,
            min: stats.min,
            max: stats.max,
        }
    }

    pub fn to_row(&self) -> StatisticRow {
        StatisticRow {
            statistic_id: self.statistic_id.clone(),
            start: self.start.to_rfc3339(),
            mean: self.mean,
            min: self.min,
            max: self.max,
        }
    }
}

/// Query output row; `start` is an ISO-8601 UTC string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticRow {
    pub statistic_id: String,
    pub start: String,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_accepts_partial_aggregates() {
        assert!(AggregateStats::new(20.0, 18.0, 22.0).validate().is_ok());
        assert!(AggregateStats::default().validate().is_ok());

        let only_extremes = AggregateStats {
            mean: None,
            min: Some(1.0),
            max: Some(1.0),
        };
        assert!(only_extremes.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_aggregates() {
        assert!(AggregateStats::new(f64::NAN, 1.0, 2.0).validate().is_err());
        assert!(AggregateStats::new(1.5, 1.0, f64::INFINITY).validate().is_err());
        assert!(AggregateStats::new(5.0, 6.0, 4.0).validate().is_err());
        assert!(AggregateStats::new(10.0, 1.0, 2.0).validate().is_err());
        assert!(AggregateStats::new(2.001, 1.0, 2.0).validate().is_err());
    }

    #[test]
    fn test_validate_accepts_rounded_mean_of_constant_input() {
        // SQLite AVG(0.1, 0.1, 0.1)
        let mean = (0.1_f64 + 0.1 + 0.1) / 3.0;
        assert!(mean > 0.1);
        assert!(AggregateStats::new(mean, 0.1, 0.1).validate().is_ok());

        let below = -0.1 - f64::EPSILON * 0.1;
        assert!(AggregateStats::new(below, -0.1, -0.1).validate().is_ok());
        assert!(AggregateStats::new(0.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_record_normalizes_identifier() {
        let window = WindowSpec::starting_at(Utc.with_ymd_and_hms(2021, 1, 1, 10, 42, 0).unwrap());
        let record = StatisticRecord::from_stats(
            "sensor",
            "Sensor.Temp",
            &window,
            &AggregateStats::new(20.0, 18.0, 22.0),
        );

        assert_eq!(record.statistic_id, "sensor.temp");
        assert_eq!(record.source, "sensor");
        assert_eq!(record.start, Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_row_serializes_iso_start() {
        let window = WindowSpec::starting_at(Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap());
        let row = StatisticRecord::from_stats(
            "sensor",
            "sensor.hum",
            &window,
            &AggregateStats {
                mean: Some(55.0),
                min: None,
                max: Some(60.0),
            },
        )
        .to_row();

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["start"], "2021-01-01T10:00:00+00:00");
        assert_eq!(json["mean"], 55.0);
        assert!(json["min"].is_null());
        assert_eq!(json["statistic_id"], "sensor.hum");
    }
}
