//! SQLite-backed store of hourly statistic records
//!
//! Table `statistics` is keyed by `(statistic_id, start)`; the primary key is
//! what makes recompiling an hour safe. `start` is stored as Unix seconds.

use super::plan_cache::{QueryPlan, QueryShape};
use super::session::{Session, SessionPool};
use super::types::{normalize_statistic_id, StatisticRecord};
use crate::config::StatisticsConfig;
use crate::error::StatisticsError;
use chrono::{DateTime, Utc};
use rusqlite::{params, ToSql};
use std::path::Path;
use std::sync::Arc;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS statistics (
    statistic_id    TEXT NOT NULL,
    start           INTEGER NOT NULL,
    source          TEXT NOT NULL,
    mean            REAL,
    min             REAL,
    max             REAL,
    PRIMARY KEY (statistic_id, start)
);
CREATE INDEX IF NOT EXISTS idx_statistics_start ON statistics(start);
"#;

/// What a write does when `(statistic_id, start)` already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the first record; later writes for the key are no-ops
    #[default]
    Ignore,
    /// Overwrite values with the latest write
    Replace,
}

impl ConflictPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "ignore" => Some(ConflictPolicy::Ignore),
            "replace" => Some(ConflictPolicy::Replace),
            _ => None,
        }
    }

    fn insert_sql(&self) -> &'static str {
        match self {
            ConflictPolicy::Ignore => {
                "INSERT INTO statistics (statistic_id, start, source, mean, min, max)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(statistic_id, start) DO NOTHING"
            }
            ConflictPolicy::Replace => {
                "INSERT INTO statistics (statistic_id, start, source, mean, min, max)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(statistic_id, start) DO UPDATE SET
                     source = excluded.source,
                     mean = excluded.mean,
                     min = excluded.min,
                     max = excluded.max"
            }
        }
    }
}

/// Range filter for `StatisticsStore::query`
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsFilter {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Already lower-cased
    pub statistic_id: Option<String>,
}

impl StatisticsFilter {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        statistic_id: Option<&str>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            statistic_id: statistic_id.map(normalize_statistic_id),
        }
    }

    pub fn shape(&self) -> QueryShape {
        QueryShape {
            with_end_time: self.end_time.is_some(),
            with_statistic_id: self.statistic_id.is_some(),
        }
    }
}

pub struct StatisticsStore {
    pool: Arc<SessionPool>,
    conflict_policy: ConflictPolicy,
}

impl StatisticsStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub fn open(
        db_path: impl AsRef<Path>,
        pool_size: usize,
        conflict_policy: ConflictPolicy,
    ) -> Result<Self, StatisticsError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = Arc::new(SessionPool::new(db_path, pool_size));
        pool.session()?.execute_batch(SCHEMA_SQL)?;

        log::info!(
            "✅ Statistics store ready at {} (on conflict: {:?})",
            db_path.display(),
            conflict_policy
        );

        Ok(Self {
            pool,
            conflict_policy,
        })
    }

    pub fn from_config(config: &StatisticsConfig) -> Result<Self, StatisticsError> {
        Self::open(&config.db_path, config.pool_size, config.conflict_policy)
    }

    /// Shared with sources reading raw data from the same database
    pub fn session_pool(&self) -> Arc<SessionPool> {
        Arc::clone(&self.pool)
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Persist one batch atomically; returns rows inserted or updated
    ///
    /// Under `ConflictPolicy::Ignore`, rows already present for a key are
    /// skipped and not counted.
    pub fn insert_or_upsert(&self, records: &[StatisticRecord]) -> Result<usize, StatisticsError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut session = self.pool.session()?;
        let tx = session.transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare_cached(self.conflict_policy.insert_sql())?;
            for record in records {
                written += stmt.execute(params![
                    record.statistic_id,
                    record.start.timestamp(),
                    record.source,
                    record.mean,
                    record.min,
                    record.max,
                ])?;
            }
        }

        tx.commit()?;

        log::debug!(
            "✅ Committed {} of {} statistic records",
            written,
            records.len()
        );
        Ok(written)
    }

    /// Records with `start` in `[start_time, end_time)`, ordered by
    /// `(statistic_id, start)`; builds a fresh plan every call
    pub fn query(
        &self,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        statistic_id: Option<&str>,
    ) -> Result<Vec<StatisticRecord>, StatisticsError> {
        let filter = StatisticsFilter::new(start_time, end_time, statistic_id);
        let plan = QueryPlan::build(filter.shape());
        self.execute_plan(&plan, &filter)
    }

    /// Run a prepared plan; `plan` must have been built for `filter.shape()`
    pub fn execute_plan(
        &self,
        plan: &QueryPlan,
        filter: &StatisticsFilter,
    ) -> Result<Vec<StatisticRecord>, StatisticsError> {
        debug_assert_eq!(plan.shape(), filter.shape());

        let session = self.pool.session()?;
        read_records(&session, plan, filter)
    }

    /// Start of the most recently compiled window, if any
    pub fn latest_start(&self) -> Result<Option<DateTime<Utc>>, StatisticsError> {
        let session = self.pool.session()?;
        let latest: Option<i64> =
            session.query_row("SELECT MAX(start) FROM statistics", [], |row| row.get(0))?;

        latest.map(timestamp_to_utc).transpose()
    }

    pub fn record_count(&self) -> Result<u64, StatisticsError> {
        let session = self.pool.session()?;
        let count: i64 =
            session.query_row("SELECT COUNT(*) FROM statistics", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn read_records(
    session: &Session<'_>,
    plan: &QueryPlan,
    filter: &StatisticsFilter,
) -> Result<Vec<StatisticRecord>, StatisticsError> {
    let start_ts = filter.start_time.timestamp();
    let end_ts = filter.end_time.map(|t| t.timestamp());

    let mut bound: Vec<(&str, &dyn ToSql)> = vec![(":start_time", &start_ts as &dyn ToSql)];
    if let Some(end_ts) = end_ts.as_ref() {
        bound.push((":end_time", end_ts as &dyn ToSql));
    }
    if let Some(statistic_id) = filter.statistic_id.as_ref() {
        bound.push((":statistic_id", statistic_id as &dyn ToSql));
    }

    let mut stmt = session.prepare_cached(plan.sql())?;
    let rows = stmt.query_map(bound.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<f64>>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (statistic_id, start, source, mean, min, max) = row?;
        records.push(StatisticRecord {
            statistic_id,
            start: timestamp_to_utc(start)?,
            source,
            mean,
            min,
            max,
        });
    }

    Ok(records)
}

fn timestamp_to_utc(ts: i64) -> Result<DateTime<Utc>, StatisticsError> {
    DateTime::from_timestamp(ts, 0).ok_or(StatisticsError::InvalidTimestamp(ts))
}
