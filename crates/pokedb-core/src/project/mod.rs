//! Shaping raw canonical documents into per-kind output documents.
//!
//! A projection turns the raw document(s) behind one entity into the cleaned
//! document written to disk: named references are flattened to their names,
//! English text is extracted, and every substructure tied to a generation
//! carries `introduced_at` (and, for per-game entries, `retired_at`) markers.
//! The root carries the entity's own introduction generation.
//!
//! Projections describe the current state across all generations. Rewinding
//! to a past generation and pruning later content are left to the reconciler
//! and the generation filter, which run after projection.

mod ability;
mod item;
mod moves;
mod species;
pub mod text;

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::document::{Document, id_from_url, ref_name};
use crate::source::{CanonicalSource, GenerationCatalog};
use crate::types::{Generation, ResourceId, ResourceKind};
use crate::{Error, Result};

/// Builds output documents for one target generation.
pub struct Projector {
    source: Arc<CanonicalSource>,
    catalog: Arc<GenerationCatalog>,
    target: Generation,
}

impl Projector {
    /// Projector for `target`, sharing the run's source and catalog.
    pub const fn new(
        source: Arc<CanonicalSource>,
        catalog: Arc<GenerationCatalog>,
        target: Generation,
    ) -> Self {
        Self {
            source,
            catalog,
            target,
        }
    }

    /// Generation documents are projected for.
    pub const fn target(&self) -> Generation {
        self.target
    }

    /// Project one entity.
    ///
    /// Returns `Ok(None)` when the entity has no presence in the target
    /// generation that markers alone could express (for example an item
    /// missing from the target generation's games).
    pub async fn project(&self, id: &ResourceId) -> Result<Option<Document>> {
        let raw = self.source.fetch_resource(id).await?;
        let projected = match id.kind {
            ResourceKind::Ability => Some(ability::project(self, id, &raw)?),
            ResourceKind::Move => Some(moves::project(self, id, &raw).await?),
            ResourceKind::Item => item::project(self, id, &raw)?,
            ResourceKind::Species => Some(species::project(self, id, &raw).await?),
            other => {
                return Err(Error::projection(
                    &id.name,
                    format!("{other} has no output shape"),
                ));
            },
        };
        if projected.is_none() {
            debug!("{} is absent from generation {}", id, self.target);
        }
        Ok(projected)
    }

    fn source(&self) -> &CanonicalSource {
        &self.source
    }

    fn catalog(&self) -> &GenerationCatalog {
        &self.catalog
    }
}

/// Sprite URL shown in summary rows, for kinds that have one.
pub fn summary_sprite(kind: ResourceKind, document: &Document) -> Option<String> {
    let sprite = match kind {
        ResourceKind::Item => document.field("sprite"),
        ResourceKind::Species => document.field("sprites").and_then(|s| s.get("front_default")),
        _ => None,
    };
    sprite.and_then(Value::as_str).map(str::to_string)
}

fn required_u32(raw: &Document, key: &str, entity: &str) -> Result<u32> {
    raw.u32_field(key)
        .ok_or_else(|| Error::projection(entity, format!("missing numeric field '{key}'")))
}

fn required_str<'a>(raw: &'a Document, key: &str, entity: &str) -> Result<&'a str> {
    raw.str_field(key)
        .ok_or_else(|| Error::projection(entity, format!("missing string field '{key}'")))
}

/// Generation referenced by a `{"generation": {"url": ...}}` link.
fn generation_ref(node: &Value) -> Option<Generation> {
    node.get("generation")
        .and_then(|g| g.get("url"))
        .and_then(Value::as_str)
        .and_then(id_from_url)
        .map(Generation::new)
}

/// Name of a named reference, or null.
fn name_or_null(node: &Value, key: &str) -> Value {
    ref_name(node, key).map_or(Value::Null, Value::from)
}

/// A field copied as-is, or null.
fn field_or_null(node: &Value, key: &str) -> Value {
    node.get(key).cloned().unwrap_or(Value::Null)
}

/// Names of every named reference in an array field.
fn names(node: &Value, key: &str) -> Value {
    node.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(Value::from)
                .collect()
        })
        .unwrap_or_else(|| Value::Array(Vec::new()))
}
