//! Range queries over compiled statistics
//!
//! Rows come back from the store sorted by `(statistic_id, start)` and are
//! grouped by walking contiguous runs of equal `statistic_id`. Grouping is
//! only correct on sorted input, so the order is checked before grouping.

use super::plan_cache::QueryPlanCache;
use super::store::{StatisticsFilter, StatisticsStore};
use super::types::{StatisticRecord, StatisticRow};
use crate::error::StatisticsError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// statistic_id -> rows ordered by `start`
pub type StatisticsByIdentity = BTreeMap<String, Vec<StatisticRow>>;

pub struct StatisticsQueryEngine {
    store: Arc<StatisticsStore>,
    plan_cache: Arc<QueryPlanCache>,
}

impl StatisticsQueryEngine {
    pub fn new(store: Arc<StatisticsStore>, plan_cache: Arc<QueryPlanCache>) -> Self {
        Self { store, plan_cache }
    }

    pub fn plan_cache(&self) -> &Arc<QueryPlanCache> {
        &self.plan_cache
    }

    /// Statistics with `start` in `[start_time, end_time)`, grouped per id
    ///
    /// An explicitly requested `statistic_id` is always present in the
    /// result, mapped to an empty vector when nothing matched. Ids that were
    /// not requested only appear when they have rows.
    pub fn statistics_during_period(
        &self,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        statistic_id: Option<&str>,
    ) -> Result<StatisticsByIdentity, StatisticsError> {
        let filter = StatisticsFilter::new(start_time, end_time, statistic_id);
        let plan = self.plan_cache.get_or_build(filter.shape());

        let mut records = self.store.execute_plan(&plan, &filter)?;
        if !is_sorted_by_identity(&records) {
            log::warn!(
                "⚠️  Statistics rows for {:?} arrived unsorted, sorting before grouping",
                plan.shape()
            );
            sort_by_identity(&mut records);
        }

        let requested: Vec<String> = filter.statistic_id.into_iter().collect();
        Ok(sorted_statistics_to_map(records, &requested))
    }
}

fn is_sorted_by_identity(records: &[StatisticRecord]) -> bool {
    records.windows(2).all(|pair| {
        (pair[0].statistic_id.as_str(), pair[0].start) <= (pair[1].statistic_id.as_str(), pair[1].start)
    })
}

fn sort_by_identity(records: &mut [StatisticRecord]) {
    records.sort_by(|a, b| {
        a.statistic_id
            .cmp(&b.statistic_id)
            .then_with(|| a.start.cmp(&b.start))
    });
}

/// Group rows already sorted by `(statistic_id, start)`
fn sorted_statistics_to_map(records: Vec<StatisticRecord>, requested: &[String]) -> StatisticsByIdentity {
    let mut result = StatisticsByIdentity::new();
    for statistic_id in requested {
        result.insert(statistic_id.clone(), Vec::new());
    }

    let mut rows = records.into_iter().peekable();
    while let Some(first) = rows.next() {
        let mut group = vec![first.to_row()];
        while let Some(next) = rows.next_if(|r| r.statistic_id == first.statistic_id) {
            group.push(next.to_row());
        }
        result.entry(first.statistic_id).or_default().extend(group);
    }

    result
}
