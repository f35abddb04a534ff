//! Pluggable aggregate sources
//!
//! A source opts in to hourly compilation by registering with the
//! `SourceRegistry`. Modules that never register are simply never polled.

use super::types::SourceAggregateResult;
use super::window::WindowSpec;
use crate::error::SourceError;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces per-entity aggregates for one window
///
/// An empty mapping means no entity of this source produced data in the
/// window, which is not an error.
#[async_trait]
pub trait SourceAggregate: Send + Sync {
    /// Stable name, stored alongside every record this source produces
    fn name(&self) -> &str;

    async fn compile_statistics(
        &self,
        window: &WindowSpec,
    ) -> Result<SourceAggregateResult, SourceError>;
}

#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceAggregate>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; an existing source with the same name is replaced
    pub fn register(&mut self, source: Arc<dyn SourceAggregate>) {
        if let Some(existing) = self
            .sources
            .iter_mut()
            .find(|s| s.name() == source.name())
        {
            log::warn!("⚠️  Replacing registered statistics source '{}'", source.name());
            *existing = source;
            return;
        }

        log::info!("📥 Registered statistics source '{}'", source.name());
        self.sources.push(source);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceAggregate>> {
        self.sources.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::types::AggregateStats;

    struct NamedSource {
        name: &'static str,
        value: f64,
    }

    #[async_trait]
    impl SourceAggregate for NamedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn compile_statistics(
            &self,
            _window: &WindowSpec,
        ) -> Result<SourceAggregateResult, SourceError> {
            let mut result = SourceAggregateResult::new();
            result.insert(
                format!("{}.value", self.name),
                AggregateStats::new(self.value, self.value, self.value),
            );
            Ok(result)
        }
    }

    #[test]
    fn test_register_in_order() {
        let mut registry = SourceRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(NamedSource { name: "sensor", value: 1.0 }));
        registry.register(Arc::new(NamedSource { name: "energy", value: 2.0 }));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["sensor", "energy"]);
    }

    #[tokio::test]
    async fn test_register_same_name_replaces() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(NamedSource { name: "sensor", value: 1.0 }));
        registry.register(Arc::new(NamedSource { name: "sensor", value: 7.0 }));

        assert_eq!(registry.len(), 1);

        let window = crate::statistics::window::current_window();
        let source = registry.iter().next().unwrap();
        let result = source.compile_statistics(&window).await.unwrap();
        assert_eq!(result["sensor.value"].mean, Some(7.0));
    }
}
