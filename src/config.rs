//! Statistics runtime configuration from environment variables

use crate::error::StatisticsError;
use crate::statistics::store::ConflictPolicy;
use std::env;
use std::time::Duration;

/// Configuration for the statistics subsystem
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct StatisticsConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Master enable flag for hourly compilation
    pub enabled: bool,

    /// Idle connections kept by the session pool
    pub pool_size: usize,

    /// Upper bound on one source's `compile_statistics` call
    pub source_timeout_ms: u64,

    /// How often the scheduler checks for a newly completed hour
    pub scheduler_interval_ms: u64,

    /// Retries after a transient storage failure
    pub retry_max: u32,

    pub retry_initial_ms: u64,

    pub retry_max_delay_ms: u64,

    /// Behaviour when an hour is compiled twice
    pub conflict_policy: ConflictPolicy,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            db_path: "statistics.db".to_string(),
            enabled: true,
            pool_size: 4,
            source_timeout_ms: 30_000,
            scheduler_interval_ms: 60_000,
            retry_max: 5,
            retry_initial_ms: 1_000,
            retry_max_delay_ms: 30_000,
            conflict_policy: ConflictPolicy::Ignore,
        }
    }
}

impl StatisticsConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STATS_DB_PATH` (default: statistics.db)
    /// - `ENABLE_STATISTICS` (default: true)
    /// - `STATS_POOL_SIZE` (default: 4)
    /// - `STATS_SOURCE_TIMEOUT_MS` (default: 30000)
    /// - `STATS_SCHEDULER_INTERVAL_MS` (default: 60000)
    /// - `STATS_RETRY_MAX` (default: 5)
    /// - `STATS_RETRY_INITIAL_MS` (default: 1000)
    /// - `STATS_RETRY_MAX_DELAY_MS` (default: 30000)
    /// - `STATS_ON_CONFLICT` (default: ignore; or replace)
    ///
    /// Unparseable numbers fall back to the default. An unknown conflict
    /// policy, or a zero pool size, source timeout or scheduler interval, is
    /// an error.
    pub fn from_env() -> Result<Self, StatisticsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StatisticsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let conflict_policy = match lookup("STATS_ON_CONFLICT") {
            Some(value) => ConflictPolicy::parse(&value).ok_or_else(|| {
                StatisticsError::Config(format!(
                    "STATS_ON_CONFLICT must be 'ignore' or 'replace', got '{}'",
                    value
                ))
            })?,
            None => defaults.conflict_policy,
        };

        let pool_size = parse_or(&lookup, "STATS_POOL_SIZE", defaults.pool_size);
        if pool_size == 0 {
            return Err(StatisticsError::Config(
                "STATS_POOL_SIZE must be at least 1".to_string(),
            ));
        }

        let source_timeout_ms = parse_or(&lookup, "STATS_SOURCE_TIMEOUT_MS", defaults.source_timeout_ms);
        if source_timeout_ms == 0 {
            return Err(StatisticsError::Config(
                "STATS_SOURCE_TIMEOUT_MS must be at least 1".to_string(),
            ));
        }

        // tokio's interval panics on a zero period
        let scheduler_interval_ms = parse_or(
            &lookup,
            "STATS_SCHEDULER_INTERVAL_MS",
            defaults.scheduler_interval_ms,
        );
        if scheduler_interval_ms == 0 {
            return Err(StatisticsError::Config(
                "STATS_SCHEDULER_INTERVAL_MS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            db_path: lookup("STATS_DB_PATH").unwrap_or(defaults.db_path),
            enabled: parse_or(&lookup, "ENABLE_STATISTICS", defaults.enabled),
            pool_size,
            source_timeout_ms,
            scheduler_interval_ms,
            retry_max: parse_or(&lookup, "STATS_RETRY_MAX", defaults.retry_max),
            retry_initial_ms: parse_or(&lookup, "STATS_RETRY_INITIAL_MS", defaults.retry_initial_ms),
            retry_max_delay_ms: parse_or(
                &lookup,
                "STATS_RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay_ms,
            ),
            conflict_policy,
        })
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().to_lowercase().parse().ok())
        .unwrap_or(default)
}
