//! # Hourly Statistics
//!
//! Periodically collapses raw measurements into one summary row per entity
//! per completed UTC hour, and serves range queries over those rows.
//!
//! ## Data Flow
//!
//! 1. `scheduler` wakes on an interval and picks the last completed hour
//! 2. `compiler` polls every registered `SourceAggregate` concurrently
//! 3. Surviving aggregates become `StatisticRecord`s
//! 4. `store` writes them in one transaction keyed by `(statistic_id, start)`
//! 5. `query` reads ranges back through the `plan_cache`, grouped per id
//!
//! Storage failures during step 4 go through `retry`; source failures only
//! drop that source's contribution for the cycle.

pub mod compiler;
pub mod plan_cache;
pub mod query;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod store;
pub mod types;
pub mod window;

pub use compiler::{CompileReport, StatisticsCompiler};
pub use plan_cache::{QueryPlan, QueryPlanCache, QueryShape};
pub use query::{StatisticsByIdentity, StatisticsQueryEngine};
pub use retry::RetryRunner;
pub use scheduler::hourly_compile_task;
pub use session::{Session, SessionPool};
pub use source::{SourceAggregate, SourceRegistry};
pub use store::{ConflictPolicy, StatisticsFilter, StatisticsStore};
pub use types::{AggregateStats, SourceAggregateResult, StatisticRecord, StatisticRow};
pub use window::{current_window, current_window_at, WindowSpec};
