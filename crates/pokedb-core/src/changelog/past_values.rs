//! Change events derived from the canonical source's own history fields.
//!
//! - Moves list `past_values`: each entry names the version group in which the
//!   listed values stopped applying.
//! - Abilities list `effect_changes` with the same meaning for effect text.
//! - Pokemon list `past_types` and `past_abilities`: each entry names the last
//!   generation the listed values applied in.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{ChangeEvent, ChangeLog, ChangeLogProvider, chain};
use crate::Result;
use crate::document::{Document, FieldPath, as_u32, id_from_url, ref_name};
use crate::project::text;
use crate::source::{CanonicalSource, GenerationCatalog};
use crate::types::{Generation, ResourceId, ResourceKind};

/// Move fields tracked in `past_values`, with how to read each one.
const MOVE_FIELDS: [(&str, MoveField); 7] = [
    ("accuracy", MoveField::Number("accuracy")),
    ("power", MoveField::Number("power")),
    ("pp", MoveField::Number("pp")),
    ("effect_chance", MoveField::Number("effect_chance")),
    ("type", MoveField::Reference("type")),
    ("effect", MoveField::Text("effect")),
    ("short_effect", MoveField::Text("short_effect")),
];

#[derive(Clone, Copy)]
enum MoveField {
    Number(&'static str),
    Reference(&'static str),
    Text(&'static str),
}

impl MoveField {
    fn read(self, entry: &Value) -> Option<Value> {
        match self {
            Self::Number(key) => entry.get(key).filter(|v| !v.is_null()).cloned(),
            Self::Reference(key) => ref_name(entry, key).map(Value::from),
            Self::Text(key) => entry
                .get("effect_entries")
                .and_then(Value::as_array)
                .and_then(|entries| text::english(entries, key))
                .map(Value::from),
        }
    }
}

/// Reads history out of the raw documents behind projected entities.
pub struct PastValuesProvider {
    source: Arc<CanonicalSource>,
    catalog: Arc<GenerationCatalog>,
}

impl PastValuesProvider {
    /// Create a provider backed by the shared source and catalog.
    pub const fn new(source: Arc<CanonicalSource>, catalog: Arc<GenerationCatalog>) -> Self {
        Self { source, catalog }
    }
}

#[async_trait]
impl ChangeLogProvider for PastValuesProvider {
    async fn changes_for(&self, id: &ResourceId, current: &Document) -> Result<ChangeLog> {
        let Some(url) = current.str_field("source_url") else {
            return Ok(ChangeLog::empty(&id.name));
        };
        let raw = self.source.fetch_url(url).await?;
        let events = history_events(id.kind, &raw, current, &self.catalog);
        debug!("{} history events for {}", events.len(), id);
        Ok(ChangeLog::new(&id.name, events))
    }
}

/// Derive change events for one entity from its raw document.
pub fn history_events(
    kind: ResourceKind,
    raw: &Document,
    current: &Document,
    catalog: &GenerationCatalog,
) -> Vec<ChangeEvent> {
    match kind {
        ResourceKind::Move => move_events(raw, current, catalog),
        ResourceKind::Ability => ability_events(raw, current, catalog),
        ResourceKind::Species | ResourceKind::Pokemon => pokemon_events(raw, current),
        _ => Vec::new(),
    }
}

fn move_events(raw: &Document, current: &Document, catalog: &GenerationCatalog) -> Vec<ChangeEvent> {
    let mut points: BTreeMap<&str, Vec<(Generation, Value)>> = BTreeMap::new();
    for entry in raw.array_field("past_values") {
        let Some(from) = version_group_generation(entry, catalog) else {
            continue;
        };
        for (field, reader) in MOVE_FIELDS {
            if let Some(old) = reader.read(entry) {
                points.entry(field).or_default().push((from, old));
            }
        }
    }
    chains(current, points)
}

fn ability_events(
    raw: &Document,
    current: &Document,
    catalog: &GenerationCatalog,
) -> Vec<ChangeEvent> {
    let mut points: BTreeMap<&str, Vec<(Generation, Value)>> = BTreeMap::new();
    for entry in raw.array_field("effect_changes") {
        let Some(from) = version_group_generation(entry, catalog) else {
            continue;
        };
        let effect = entry
            .get("effect_entries")
            .and_then(Value::as_array)
            .and_then(|entries| text::english(entries, "effect"));
        if let Some(effect) = effect {
            points.entry("effect").or_default().push((from, Value::from(effect)));
        }
    }
    chains(current, points)
}

fn pokemon_events(raw: &Document, current: &Document) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    let type_points: Vec<(Generation, Value)> = raw
        .array_field("past_types")
        .iter()
        .filter_map(|entry| {
            let from = last_generation(entry)?.next();
            let types: Vec<Value> = entry
                .get("types")
                .and_then(Value::as_array)?
                .iter()
                .filter_map(|t| ref_name(t, "type").map(Value::from))
                .collect();
            Some((from, Value::Array(types)))
        })
        .collect();
    if let Some(types) = current.field("types") {
        events.extend(chain(&FieldPath::keys(["types"]), type_points, types));
    }

    let mut ability_points: BTreeMap<usize, Vec<(Generation, Value)>> = BTreeMap::new();
    for entry in raw.array_field("past_abilities") {
        let Some(from) = last_generation(entry).map(Generation::next) else {
            continue;
        };
        let listed = entry.get("abilities").and_then(Value::as_array);
        for ability in listed.into_iter().flatten() {
            let Some(name) = ref_name(ability, "ability") else {
                continue;
            };
            if let Some(index) = ability_index(current, ability) {
                ability_points
                    .entry(index)
                    .or_default()
                    .push((from, Value::from(name)));
            }
        }
    }
    for (index, points) in ability_points {
        let path = FieldPath::keys(["abilities"]).index(index).key("name");
        if let Some(now) = current.get_path(&path) {
            events.extend(chain(&path, points, now));
        }
    }

    events
}

fn chains(current: &Document, points: BTreeMap<&str, Vec<(Generation, Value)>>) -> Vec<ChangeEvent> {
    points
        .into_iter()
        .flat_map(|(field, points)| {
            let now = current.field(field).cloned().unwrap_or(Value::Null);
            chain(&FieldPath::keys([field]), points, &now)
        })
        .collect()
}

fn version_group_generation(entry: &Value, catalog: &GenerationCatalog) -> Option<Generation> {
    ref_name(entry, "version_group").and_then(|name| catalog.generation_of_version_group(name))
}

fn last_generation(entry: &Value) -> Option<Generation> {
    entry
        .get("generation")
        .and_then(|g| g.get("url"))
        .and_then(Value::as_str)
        .and_then(id_from_url)
        .map(Generation::new)
}

/// Position in the projected `abilities` list of the slot a past ability held.
fn ability_index(current: &Document, past: &Value) -> Option<usize> {
    let slot = past.get("slot").and_then(as_u32)?;
    let hidden = past.get("is_hidden").and_then(Value::as_bool).unwrap_or(false);
    current.array_field("abilities").iter().position(|a| {
        a.get("slot").and_then(as_u32) == Some(slot)
            && a.get("is_hidden").and_then(Value::as_bool).unwrap_or(false) == hidden
    })
}
