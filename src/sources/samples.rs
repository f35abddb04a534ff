//! Source over a raw `samples` table in the statistics database
//!
//! Producers append `(statistic_id, timestamp, value)` rows; at compile time
//! this source reduces the rows of one window to AVG/MIN/MAX per id.

use crate::error::{SourceError, StatisticsError};
use crate::statistics::session::SessionPool;
use crate::statistics::source::SourceAggregate;
use crate::statistics::types::{AggregateStats, SourceAggregateResult};
use crate::statistics::window::WindowSpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::sync::Arc;

pub const SAMPLES_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS samples (
    statistic_id    TEXT NOT NULL,
    timestamp       INTEGER NOT NULL,
    value           REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp);
"#;

const WINDOW_AGGREGATE_SQL: &str = r#"
SELECT statistic_id, AVG(value), MIN(value), MAX(value)
FROM samples
WHERE timestamp >= ?1 AND timestamp < ?2
GROUP BY statistic_id
"#;

pub struct SampleTableSource {
    name: String,
    pool: Arc<SessionPool>,
}

impl SampleTableSource {
    pub fn new(name: impl Into<String>, pool: Arc<SessionPool>) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    pub fn ensure_schema(&self) -> Result<(), StatisticsError> {
        self.pool.session()?.execute_batch(SAMPLES_SCHEMA_SQL)?;
        Ok(())
    }

    pub fn record_sample(
        &self,
        statistic_id: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<(), StatisticsError> {
        let session = self.pool.session()?;
        session
            .prepare_cached("INSERT INTO samples (statistic_id, timestamp, value) VALUES (?1, ?2, ?3)")?
            .execute(params![statistic_id, timestamp.timestamp(), value])?;
        Ok(())
    }
}

#[async_trait]
impl SourceAggregate for SampleTableSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile_statistics(&self, window: &WindowSpec) -> Result<SourceAggregateResult, SourceError> {
        let pool = Arc::clone(&self.pool);
        let (start, end) = (window.start_timestamp(), window.end_timestamp());

        // rusqlite blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || aggregate_window(&pool, start, end))
            .await
            .map_err(|e| SourceError::Failed(format!("sample aggregation task failed: {}", e)))?
    }
}

fn aggregate_window(pool: &SessionPool, start: i64, end: i64) -> Result<SourceAggregateResult, SourceError> {
    let session = pool.session()?;
    let mut stmt = session.prepare_cached(WINDOW_AGGREGATE_SQL)?;

    let rows = stmt.query_map(params![start, end], |row| {
        Ok((
            row.get::<_, String>(0)?,
            AggregateStats {
                mean: row.get(1)?,
                min: row.get(2)?,
                max: row.get(3)?,
            },
        ))
    })?;

    let mut result = SourceAggregateResult::new();
    for row in rows {
        let (statistic_id, stats) = row?;
        result.insert(statistic_id, stats);
    }
    Ok(result)
}
