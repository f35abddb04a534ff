//! Query plan reuse for statistics range reads
//!
//! The set of query shapes is tiny (end_time present or not, statistic_id
//! present or not), so plans are built once per shape and live for the whole
//! process. On top of the shared SQL text, each pooled connection keeps the
//! compiled statement in rusqlite's statement cache (`prepare_cached`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Which optional filters a range query carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryShape {
    pub with_end_time: bool,
    pub with_statistic_id: bool,
}

impl QueryShape {
    #[cfg(test)]
    pub fn all() -> [QueryShape; 4] {
        [
            QueryShape { with_end_time: false, with_statistic_id: false },
            QueryShape { with_end_time: true, with_statistic_id: false },
            QueryShape { with_end_time: false, with_statistic_id: true },
            QueryShape { with_end_time: true, with_statistic_id: true },
        ]
    }
}

/// Parameterized SELECT for one shape
///
/// Binds `:start_time`, and `:end_time` / `:statistic_id` when the shape
/// includes them. Rows come back ordered by `(statistic_id, start)`, which
/// the query engine's grouping depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    shape: QueryShape,
    sql: String,
}

impl QueryPlan {
    pub fn build(shape: QueryShape) -> Self {
        let mut sql = String::from(
            "SELECT statistic_id, start, source, mean, min, max
             FROM statistics
             WHERE start >= :start_time",
        );

        if shape.with_end_time {
            sql.push_str(" AND start < :end_time");
        }
        if shape.with_statistic_id {
            sql.push_str(" AND statistic_id = :statistic_id");
        }

        sql.push_str(" ORDER BY statistic_id ASC, start ASC");

        Self { shape, sql }
    }

    pub fn shape(&self) -> QueryShape {
        self.shape
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[derive(Debug, Default)]
pub struct QueryPlanCache {
    plans: RwLock<HashMap<QueryShape, Arc<QueryPlan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, shape: QueryShape) -> Arc<QueryPlan> {
        if let Some(plan) = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&shape)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(plan);
        }

        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have built it between the two locks
        if let Some(plan) = plans.get(&shape) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(plan);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("🔧 Building statistics query plan for {:?}", shape);
        let plan = Arc::new(QueryPlan::build(shape));
        plans.insert(shape, Arc::clone(&plan));
        plan
    }

    pub fn len(&self) -> usize {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
