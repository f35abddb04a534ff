//! Hourly statistics compilation
//!
//! One cycle: align the window, poll every registered source concurrently,
//! drop the contribution of any source that fails, then write everything
//! that survived in a single transaction.

use super::source::{SourceAggregate, SourceRegistry};
use super::store::StatisticsStore;
use super::types::{SourceAggregateResult, StatisticRecord};
use super::window::WindowSpec;
use crate::error::{SourceError, StatisticsError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one compilation cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub window: WindowSpec,
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub records_built: usize,
    pub records_written: usize,
}

pub struct StatisticsCompiler {
    store: Arc<StatisticsStore>,
    registry: SourceRegistry,
    source_timeout: Duration,
}

impl StatisticsCompiler {
    pub fn new(store: Arc<StatisticsStore>, registry: SourceRegistry, source_timeout: Duration) -> Self {
        Self {
            store,
            registry,
            source_timeout,
        }
    }

    pub fn store(&self) -> &Arc<StatisticsStore> {
        &self.store
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Compile the window starting at `start`
    ///
    /// Storage errors are returned so a retry runner can re-invoke with the
    /// same `start`; source errors are absorbed. Safe to call again for an
    /// already compiled window.
    pub async fn compile(&self, start: DateTime<Utc>) -> Result<bool, StatisticsError> {
        self.compile_window(start).await.map(|_| true)
    }

    pub async fn compile_window(&self, start: DateTime<Utc>) -> Result<CompileReport, StatisticsError> {
        let window = WindowSpec::starting_at(start);
        if window.start() != start {
            log::debug!("Aligned compile start {} to {}", start, window.start());
        }
        log::debug!("Compiling statistics for {}", window);

        let (contributions, sources_failed) = self.poll_sources(window).await;

        let mut records = Vec::new();
        for (source, stats) in &contributions {
            records.extend(
                stats
                    .iter()
                    .map(|(statistic_id, agg)| StatisticRecord::from_stats(source, statistic_id, &window, agg)),
            );
        }

        let records_built = records.len();
        let store = Arc::clone(&self.store);
        // rusqlite blocks (up to the busy timeout); keep it off the async workers
        let records_written =
            tokio::task::spawn_blocking(move || store.insert_or_upsert(&records)).await??;

        let report = CompileReport {
            window,
            sources_polled: self.registry.len(),
            sources_failed,
            records_built,
            records_written,
        };

        log::info!(
            "📊 Compiled statistics for {}: {} sources ({} failed), {} records ({} written)",
            report.window,
            report.sources_polled,
            report.sources_failed,
            report.records_built,
            report.records_written
        );

        Ok(report)
    }

    /// Returns surviving `(source name, aggregates)` pairs and the failure count
    async fn poll_sources(&self, window: WindowSpec) -> (Vec<(String, SourceAggregateResult)>, usize) {
        // Spawn everything first so sources run concurrently
        let tasks: Vec<(String, JoinHandle<Result<SourceAggregateResult, SourceError>>)> = self
            .registry
            .iter()
            .map(|source| {
                let name = source.name().to_string();
                let handle = tokio::spawn(poll_source(Arc::clone(source), window, self.source_timeout));
                (name, handle)
            })
            .collect();

        let mut contributions = Vec::with_capacity(tasks.len());
        let mut failed = 0;

        for (name, handle) in tasks {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(SourceError::Panicked(join_err.to_string())),
            };

            match outcome {
                Ok(stats) => {
                    log::debug!("Statistics for {} during {}: {} entities", name, window, stats.len());
                    contributions.push((name, stats));
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("⚠️  Dropping statistics source '{}' for {}: {}", name, window, e);
                }
            }
        }

        (contributions, failed)
    }
}

async fn poll_source(
    source: Arc<dyn SourceAggregate>,
    window: WindowSpec,
    timeout: Duration,
) -> Result<SourceAggregateResult, SourceError> {
    let stats = match tokio::time::timeout(timeout, source.compile_statistics(&window)).await {
        Ok(result) => result?,
        Err(_) => return Err(SourceError::Timeout(timeout)),
    };

    validate_result(&stats)?;
    Ok(stats)
}

/// One malformed entry rejects the whole source contribution
fn validate_result(stats: &SourceAggregateResult) -> Result<(), SourceError> {
    for (statistic_id, agg) in stats {
        if statistic_id.trim().is_empty() {
            return Err(SourceError::Malformed("empty statistic_id".to_string()));
        }
        agg.validate()
            .map_err(|msg| SourceError::Malformed(format!("{}: {}", statistic_id, msg)))?;
    }
    Ok(())
}
