//! Statistics Runtime
//!
//! Compiles the most recently completed hour of every registered source into
//! the `statistics` table, then keeps doing so until CTRL+C.
//!
//! Usage:
//!   statistics_runtime                 run the hourly scheduler
//!   statistics_runtime --dump [hours]  print the trailing hours as JSON and exit
//!
//! Environment variables:
//!   STATS_DB_PATH - SQLite database path (default: statistics.db)
//!   ENABLE_STATISTICS - Master switch (default: true)
//!   STATS_SCHEDULER_INTERVAL_MS - Scheduler check interval (default: 60000)
//!   STATS_SOURCE_TIMEOUT_MS - Per-source timeout (default: 30000)
//!   STATS_ON_CONFLICT - ignore | replace (default: ignore)

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dotenv::dotenv;
use log::{error, info};
use statflow::sources::SampleTableSource;
use statflow::statistics::{
    hourly_compile_task, QueryPlanCache, RetryRunner, SourceRegistry, StatisticsCompiler,
    StatisticsQueryEngine, StatisticsStore,
};
use statflow::StatisticsConfig;
use std::env;
use std::sync::Arc;

const DEFAULT_DUMP_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let config = StatisticsConfig::from_env()?;

    let args: Vec<String> = env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("--dump") {
        let hours = match args.get(1) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| format!("--dump expects a number of hours, got '{}'", raw))?,
            None => DEFAULT_DUMP_HOURS,
        };
        return dump(&config, hours);
    }

    info!("🚀 Statistics Runtime");

    if !config.enabled {
        info!("⚠️  Statistics are DISABLED (set ENABLE_STATISTICS=true to activate)");
        info!("   └─ Exiting gracefully...");
        return Ok(());
    }

    info!("✅ Statistics ENABLED");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Session pool: {} connections", config.pool_size);
    info!("   ├─ Source timeout: {}ms", config.source_timeout_ms);
    info!("   ├─ Check interval: {}ms", config.scheduler_interval_ms);
    info!("   └─ On conflict: {:?}", config.conflict_policy);

    let store = Arc::new(StatisticsStore::from_config(&config)?);

    let samples = SampleTableSource::new("samples", store.session_pool());
    samples.ensure_schema()?;

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(samples));
    info!("✅ Registered sources: {}", registry.names().join(", "));

    let compiler = Arc::new(StatisticsCompiler::new(
        Arc::clone(&store),
        registry,
        config.source_timeout(),
    ));
    let runner = Arc::new(RetryRunner::from_config(&config));

    let check_interval = config.scheduler_interval();
    let scheduler = tokio::spawn(hourly_compile_task(compiler, runner, check_interval));
    info!("✅ Scheduler task spawned");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    scheduler.abort();

    info!("✅ Statistics runtime stopped");
    Ok(())
}

fn dump(config: &StatisticsConfig, hours: i64) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(StatisticsStore::from_config(config)?);
    let engine = StatisticsQueryEngine::new(store, Arc::new(QueryPlanCache::new()));

    let start_time = dump_start(Utc::now(), hours)
        .ok_or_else(|| format!("--dump hours out of range: {}", hours))?;
    let stats = engine.statistics_during_period(start_time, None, None)?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Start of the trailing `hours` window, `None` when it cannot be represented
fn dump_start(now: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    if hours < 0 {
        return None;
    }
    now.checked_sub_signed(ChronoDuration::try_hours(hours)?)
}
