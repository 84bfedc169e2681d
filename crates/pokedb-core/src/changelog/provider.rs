use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::ChangeLog;
use crate::Result;
use crate::document::Document;
use crate::types::ResourceId;

/// Supplies the change history of an entity.
///
/// `current` is the projected current-state document, so providers can
/// resolve field paths (such as the index of a non-hidden ability) against
/// the shape the reconciler will see.
#[async_trait]
pub trait ChangeLogProvider: Send + Sync {
    /// Change log for `id`; an entity without history yields an empty log.
    async fn changes_for(&self, id: &ResourceId, current: &Document) -> Result<ChangeLog>;
}

/// Provider for entities without any recorded history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChanges;

#[async_trait]
impl ChangeLogProvider for NoChanges {
    async fn changes_for(&self, id: &ResourceId, _current: &Document) -> Result<ChangeLog> {
        Ok(ChangeLog::empty(&id.name))
    }
}

/// Combines the logs of several providers.
///
/// Providers are consulted in the order they were added. A later provider
/// takes precedence per field path: where it has events for a path, the
/// events earlier providers gave for that path are dropped. Identical events
/// from different providers collapse into one.
#[derive(Default, Clone)]
pub struct CompositeProvider {
    providers: Vec<Arc<dyn ChangeLogProvider>>,
}

impl CompositeProvider {
    /// Empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider.
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn ChangeLogProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers were added.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ChangeLogProvider for CompositeProvider {
    async fn changes_for(&self, id: &ResourceId, current: &Document) -> Result<ChangeLog> {
        let mut log = ChangeLog::empty(&id.name);
        for provider in &self.providers {
            let replaced = log.overlay(provider.changes_for(id, current).await?);
            if replaced > 0 {
                debug!("{} earlier change events for {} superseded", replaced, id);
            }
        }
        Ok(log)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::changelog::past_values::history_events;
    use crate::changelog::{ChangeEvent, GenerationRange, ScrapedRecords};
    use crate::reconcile::ReconciliationEngine;
    use crate::source::GenerationCatalog;
    use crate::document::FieldPath;
    use crate::types::{Generation, ResourceKind};
    use serde_json::json;

    struct Fixed(Vec<ChangeEvent>);

    #[async_trait]
    impl ChangeLogProvider for Fixed {
        async fn changes_for(&self, id: &ResourceId, _current: &Document) -> Result<ChangeLog> {
            Ok(ChangeLog::new(&id.name, self.0.clone()))
        }
    }

    fn event(path: &str, from: u32) -> ChangeEvent {
        ChangeEvent {
            field_path: FieldPath::keys([path]),
            range: GenerationRange::open(Generation::new(from)),
            old_value: json!(1),
            new_value: json!(2),
        }
    }

    #[tokio::test]
    async fn test_no_changes_is_empty() {
        let id = ResourceId::new(ResourceKind::Move, 1, "pound");
        let log = NoChanges.changes_for(&id, &Document::new(json!({}))).await.unwrap();
        assert!(log.is_empty());
        assert_eq!(log.entity(), "pound");
    }

    #[tokio::test]
    async fn test_composite_merges_in_order() {
        let composite = CompositeProvider::new()
            .with(Arc::new(Fixed(vec![event("power", 4)])))
            .with(Arc::new(Fixed(vec![event("pp", 6)])))
            .with(Arc::new(NoChanges));
        assert_eq!(composite.len(), 3);

        let id = ResourceId::new(ResourceKind::Move, 33, "tackle");
        let log = composite
            .changes_for(&id, &Document::new(json!({})))
            .await
            .unwrap();
        let froms: Vec<u32> = log.events().iter().map(|e| e.range.from.get()).collect();
        assert_eq!(froms, [6, 4]);
    }

    #[tokio::test]
    async fn test_later_provider_wins_per_path() {
        let mut replaced = event("power", 4);
        replaced.new_value = json!(3);
        let composite = CompositeProvider::new()
            .with(Arc::new(Fixed(vec![replaced, event("pp", 6)])))
            .with(Arc::new(Fixed(vec![event("power", 5)])));

        let id = ResourceId::new(ResourceKind::Move, 33, "tackle");
        let log = composite
            .changes_for(&id, &Document::new(json!({})))
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.validate(Generation::new(9)).is_ok());
        let power = &log.by_path()[&FieldPath::keys(["power"])];
        assert_eq!(power[0].range.from, Generation::new(5));
    }

    #[tokio::test]
    async fn test_past_types_and_scraped_types_agree() {
        let raw = Document::new(json!({
            "past_types": [{
                "generation": {"name": "generation-v", "url": "https://pokeapi.co/api/v2/generation/5/"},
                "types": [{"slot": 1, "type": {"name": "normal"}}]
            }]
        }));
        let current = Document::new(json!({
            "name": "clefairy",
            "types": ["fairy"],
            "abilities": [{"name": "cute-charm", "is_hidden": false, "slot": 1}],
            "stats": {"hp": 70}
        }));
        let latest = Generation::new(9);

        let past = history_events(
            ResourceKind::Species,
            &raw,
            &current,
            &GenerationCatalog::new(latest),
        );
        let scraped: ScrapedRecords = serde_json::from_value(json!({
            "changes": [{"generations": [1, 2, 3, 4, 5], "change": {"types": ["Normal"]}}]
        }))
        .unwrap();
        let scraped = scraped.into_events("clefairy", &current, latest).unwrap();

        let composite = CompositeProvider::new()
            .with(Arc::new(Fixed(past)))
            .with(Arc::new(Fixed(scraped)));
        let id = ResourceId::new(ResourceKind::Species, 35, "clefairy");
        let log = composite.changes_for(&id, &current).await.unwrap();
        assert_eq!(log.len(), 1);

        let rewound = ReconciliationEngine::new(latest)
            .reconcile(&current, &log, Generation::new(3))
            .unwrap();
        assert_eq!(rewound.field("types"), Some(&json!(["normal"])));
    }
}
