//! Background scheduler for hourly compilation
//!
//! Ticks on a fixed interval and compiles the most recently completed hour
//! once it appears. Each window goes through the retry runner exactly once
//! per process; a window that fails permanently is left as a gap.

use super::compiler::StatisticsCompiler;
use super::retry::RetryRunner;
use super::window::{current_window, WindowSpec};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Hourly compile task - runs indefinitely until cancelled
///
/// Arguments:
/// - `compiler`: Shared compiler with its registered sources
/// - `runner`: Retry policy applied to each compilation cycle
/// - `check_interval`: How often to look for a newly completed hour
pub async fn hourly_compile_task(
    compiler: Arc<StatisticsCompiler>,
    runner: Arc<RetryRunner>,
    check_interval: Duration,
) {
    log::info!("⏰ Starting statistics scheduler (interval: {:?})", check_interval);

    let mut last_compiled = match compiler.store().latest_start() {
        Ok(latest) => latest,
        Err(e) => {
            log::warn!("⚠️  Could not read last compiled window: {}", e);
            None
        }
    };
    if let Some(latest) = last_compiled {
        log::info!("   Resuming after window starting {}", latest.to_rfc3339());
    }

    // interval() panics on a zero period
    let mut timer = interval(check_interval.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if let Some(start) = compile_if_due(&compiler, &runner, current_window(), last_compiled).await {
            last_compiled = Some(start);
        }
    }
}

/// Compile `window` unless a window at or after it was already handled
///
/// Returns the start of the window that was attempted, so the caller can
/// advance its high-water mark whether or not the attempt succeeded.
pub async fn compile_if_due(
    compiler: &StatisticsCompiler,
    runner: &RetryRunner,
    window: WindowSpec,
    last_compiled: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if last_compiled.is_some_and(|last| last >= window.start()) {
        return None;
    }

    let start = window.start();
    let ok = runner
        .run_with_retry("statistics", move || compiler.compile(start))
        .await;

    if !ok {
        log::error!("❌ Statistics for {} were not compiled", window);
    }

    Some(start)
}
