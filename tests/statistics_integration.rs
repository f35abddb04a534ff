//! End-to-end tests: sources -> compiler -> SQLite -> query engine
//!
//! Each test owns a throwaway database and wires the same components the
//! `statistics_runtime` binary does.

#[cfg(test)]
mod statistics_integration_tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use statflow::sources::SampleTableSource;
    use statflow::statistics::{
        AggregateStats, ConflictPolicy, QueryPlanCache, SourceAggregate, SourceAggregateResult,
        SourceRegistry, StatisticsCompiler, StatisticsQueryEngine, StatisticsStore, WindowSpec,
    };
    use statflow::SourceError;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct StaticSource {
        name: &'static str,
        stats: Vec<(&'static str, AggregateStats)>,
    }

    #[async_trait]
    impl SourceAggregate for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn compile_statistics(
            &self,
            _window: &WindowSpec,
        ) -> Result<SourceAggregateResult, SourceError> {
            Ok(self
                .stats
                .iter()
                .map(|(id, agg)| (id.to_string(), *agg))
                .collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SourceAggregate for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn compile_statistics(
            &self,
            _window: &WindowSpec,
        ) -> Result<SourceAggregateResult, SourceError> {
            Err(SourceError::Failed("upstream unavailable".to_string()))
        }
    }

    struct Harness {
        _dir: TempDir,
        store: Arc<StatisticsStore>,
        compiler: StatisticsCompiler,
        engine: StatisticsQueryEngine,
    }

    fn harness(sources: Vec<Arc<dyn SourceAggregate>>) -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            StatisticsStore::open(dir.path().join("statistics.db"), 4, ConflictPolicy::Ignore).unwrap(),
        );

        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }

        let compiler = StatisticsCompiler::new(Arc::clone(&store), registry, Duration::from_secs(5));
        let engine = StatisticsQueryEngine::new(Arc::clone(&store), Arc::new(QueryPlanCache::new()));

        Harness {
            _dir: dir,
            store,
            compiler,
            engine,
        }
    }

    fn temp_source() -> Arc<dyn SourceAggregate> {
        Arc::new(StaticSource {
            name: "source_a",
            stats: vec![("sensor.temp", AggregateStats::new(20.0, 18.0, 22.0))],
        })
    }

    fn hum_source() -> Arc<dyn SourceAggregate> {
        Arc::new(StaticSource {
            name: "source_b",
            stats: vec![("sensor.hum", AggregateStats::new(55.0, 50.0, 60.0))],
        })
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_two_sources_end_to_end() {
        let h = harness(vec![temp_source(), hum_source()]);

        assert!(h.compiler.compile(hour(10)).await.unwrap());

        let result = h
            .engine
            .statistics_during_period(hour(10), Some(hour(11)), None)
            .unwrap();

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "sensor.hum": [{
                    "statistic_id": "sensor.hum",
                    "start": "2021-01-01T10:00:00+00:00",
                    "mean": 55.0,
                    "min": 50.0,
                    "max": 60.0
                }],
                "sensor.temp": [{
                    "statistic_id": "sensor.temp",
                    "start": "2021-01-01T10:00:00+00:00",
                    "mean": 20.0,
                    "min": 18.0,
                    "max": 22.0
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_requested_missing_statistic() {
        let h = harness(vec![temp_source(), hum_source()]);
        h.compiler.compile(hour(10)).await.unwrap();

        let result = h
            .engine
            .statistics_during_period(hour(10), Some(hour(11)), Some("sensor.missing"))
            .unwrap();

        assert_eq!(serde_json::to_value(&result).unwrap(), json!({ "sensor.missing": [] }));
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let h = harness(vec![Arc::new(FailingSource) as Arc<dyn SourceAggregate>, temp_source()]);

        let report = h.compiler.compile_window(hour(10)).await.unwrap();
        assert_eq!(report.sources_failed, 1);

        let result = h
            .engine
            .statistics_during_period(hour(10), Some(hour(11)), None)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["sensor.temp"].len(), 1);
    }

    #[tokio::test]
    async fn test_compile_is_idempotent() {
        let h = harness(vec![temp_source(), hum_source()]);

        assert!(h.compiler.compile(hour(10)).await.unwrap());
        assert!(h.compiler.compile(hour(10)).await.unwrap());

        assert_eq!(h.store.record_count().unwrap(), 2);
        let result = h
            .engine
            .statistics_during_period(hour(10), None, Some("sensor.temp"))
            .unwrap();
        assert_eq!(result["sensor.temp"].len(), 1);
    }

    #[tokio::test]
    async fn test_case_insensitive_lookup() {
        let h = harness(vec![temp_source()]);
        h.compiler.compile(hour(10)).await.unwrap();

        let mixed = h
            .engine
            .statistics_during_period(hour(0), None, Some("Sensor.TEMP"))
            .unwrap();
        let lower = h
            .engine
            .statistics_during_period(hour(0), None, Some("sensor.temp"))
            .unwrap();

        assert_eq!(mixed, lower);
        assert_eq!(mixed["sensor.temp"].len(), 1);
    }

    #[tokio::test]
    async fn test_hours_sorted_within_each_statistic() {
        let h = harness(vec![temp_source(), hum_source()]);
        for start in [hour(12), hour(10), hour(11)] {
            h.compiler.compile(start).await.unwrap();
        }

        let result = h.engine.statistics_during_period(hour(0), None, None).unwrap();

        for rows in result.values() {
            let starts: Vec<&str> = rows.iter().map(|r| r.start.as_str()).collect();
            assert_eq!(
                starts,
                vec![
                    "2021-01-01T10:00:00+00:00",
                    "2021-01-01T11:00:00+00:00",
                    "2021-01-01T12:00:00+00:00"
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_sample_table_source_end_to_end() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            StatisticsStore::open(dir.path().join("statistics.db"), 2, ConflictPolicy::Ignore).unwrap(),
        );

        let samples = SampleTableSource::new("samples", store.session_pool());
        samples.ensure_schema().unwrap();
        for (minute, value) in [(0, 10.0), (20, 20.0), (40, 30.0)] {
            samples
                .record_sample("Sensor.Power", hour(10) + chrono::Duration::minutes(minute), value)
                .unwrap();
        }

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(samples));
        let compiler = StatisticsCompiler::new(Arc::clone(&store), registry, Duration::from_secs(5));
        compiler.compile(hour(10)).await.unwrap();

        let engine = StatisticsQueryEngine::new(store, Arc::new(QueryPlanCache::new()));
        let result = engine
            .statistics_during_period(hour(10), Some(hour(11)), Some("sensor.power"))
            .unwrap();

        let row = &result["sensor.power"][0];
        assert_eq!(row.mean, Some(20.0));
        assert_eq!(row.min, Some(10.0));
        assert_eq!(row.max, Some(30.0));
    }

    #[tokio::test]
    async fn test_constant_float_samples_are_compiled() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            StatisticsStore::open(dir.path().join("statistics.db"), 2, ConflictPolicy::Ignore).unwrap(),
        );

        let samples = SampleTableSource::new("samples", store.session_pool());
        samples.ensure_schema().unwrap();
        for minute in [10, 30, 50] {
            samples
                .record_sample("sensor.x", hour(10) + chrono::Duration::minutes(minute), 0.1)
                .unwrap();
        }

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(samples));
        let compiler = StatisticsCompiler::new(Arc::clone(&store), registry, Duration::from_secs(5));

        let report = compiler.compile_window(hour(10)).await.unwrap();
        assert_eq!(report.sources_failed, 0);
        assert_eq!(report.records_written, 1);

        let records = store.query(hour(10), Some(hour(11)), Some("sensor.x")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].min, Some(0.1));
        assert_eq!(records[0].max, Some(0.1));
    }
}
