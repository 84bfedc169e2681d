use serde_json::Value;
use std::collections::BTreeSet;

use super::{Projector, field_or_null, generation_ref, name_or_null, names, required_str, required_u32, text};
use crate::Result;
use crate::document::{Document, INTRODUCED_AT, object};
use crate::types::{Generation, ResourceId};

/// Items exist in exactly the generations their game indices name.
///
/// An item without game indices, or missing from the target generation while
/// present earlier, yields `None`. An item first seen after the target keeps
/// its root marker so the reconciler reports it as not yet introduced.
pub(super) fn project(
    projector: &Projector,
    id: &ResourceId,
    raw: &Document,
) -> Result<Option<Document>> {
    let generations: BTreeSet<Generation> = raw
        .array_field("game_indices")
        .iter()
        .filter_map(generation_ref)
        .collect();
    let Some(&introduced) = generations.first() else {
        return Ok(None);
    };
    let target = projector.target();
    if target >= introduced && !generations.contains(&target) {
        return Ok(None);
    }

    let raw_value = raw.as_value();
    let effects = raw.array_field("effect_entries");
    let catalog = projector.catalog();
    let flavor_text = text::english_by_game(
        raw.array_field("flavor_text_entries"),
        "text",
        "version_group",
        |vg| catalog.generation_of_version_group(vg),
    );
    let sprite = raw
        .field("sprites")
        .and_then(|s| s.get("default"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Some(Document::new(object([
        ("id", Value::from(required_u32(raw, "id", &id.name)?)),
        ("name", Value::from(required_str(raw, "name", &id.name)?)),
        ("source_url", Value::from(projector.source().resource_url(id.kind, id.id))),
        (INTRODUCED_AT, Value::from(introduced.get())),
        ("cost", field_or_null(raw_value, "cost")),
        ("fling_power", field_or_null(raw_value, "fling_power")),
        ("fling_effect", name_or_null(raw_value, "fling_effect")),
        ("attributes", names(raw_value, "attributes")),
        ("category", name_or_null(raw_value, "category")),
        ("effect", text::english(effects, "effect").map_or(Value::Null, Value::from)),
        ("short_effect", text::english(effects, "short_effect").map_or(Value::Null, Value::from)),
        ("flavor_text", flavor_text),
        ("sprite", sprite),
    ]))))
}
