use serde_json::Value;
use tracing::warn;

use super::{Projector, field_or_null, generation_ref, name_or_null, required_str, required_u32, text};
use crate::Result;
use crate::document::{Document, INTRODUCED_AT, object, ref_name};
use crate::types::ResourceId;

/// Numeric metadata fields that default to zero when the source omits them.
const ZEROED_META: [&str; 6] = [
    "drain",
    "healing",
    "crit_rate",
    "ailment_chance",
    "flinch_chance",
    "stat_chance",
];

/// Hit and turn ranges, null when not applicable.
const RANGE_META: [&str; 4] = ["min_hits", "max_hits", "min_turns", "max_turns"];

pub(super) async fn project(
    projector: &Projector,
    id: &ResourceId,
    raw: &Document,
) -> Result<Document> {
    let raw_value = raw.as_value();
    let effects = raw.array_field("effect_entries");
    let catalog = projector.catalog();
    let flavor_text = text::english_by_game(
        raw.array_field("flavor_text_entries"),
        "flavor_text",
        "version_group",
        |vg| catalog.generation_of_version_group(vg),
    );

    let mut fields = vec![
        ("id", Value::from(required_u32(raw, "id", &id.name)?)),
        ("name", Value::from(required_str(raw, "name", &id.name)?)),
        ("source_url", Value::from(projector.source().resource_url(id.kind, id.id))),
        ("accuracy", field_or_null(raw_value, "accuracy")),
        ("power", field_or_null(raw_value, "power")),
        ("pp", field_or_null(raw_value, "pp")),
        ("priority", field_or_null(raw_value, "priority")),
        ("damage_class", name_or_null(raw_value, "damage_class")),
        ("type", name_or_null(raw_value, "type")),
        ("target", name_or_null(raw_value, "target")),
        ("effect_chance", field_or_null(raw_value, "effect_chance")),
        ("effect", text::english(effects, "effect").map_or(Value::Null, Value::from)),
        ("short_effect", text::english(effects, "short_effect").map_or(Value::Null, Value::from)),
        ("flavor_text", flavor_text),
        ("stat_changes", stat_changes(raw)),
        ("machine", machine(projector, raw).await.map_or(Value::Null, Value::from)),
        ("metadata", metadata(raw.field("meta"))),
    ];
    if let Some(generation) = generation_ref(raw_value) {
        fields.push((INTRODUCED_AT, Value::from(generation.get())));
    }

    Ok(Document::new(object(fields)))
}

fn stat_changes(raw: &Document) -> Value {
    raw.array_field("stat_changes")
        .iter()
        .map(|change| {
            object([
                ("change", field_or_null(change, "change")),
                ("stat", name_or_null(change, "stat")),
            ])
        })
        .collect()
}

fn metadata(meta: Option<&Value>) -> Value {
    let meta = meta.filter(|m| m.is_object());
    let mut fields = vec![
        ("ailment", meta.map_or(Value::Null, |m| name_or_null(m, "ailment"))),
        ("category", meta.map_or(Value::Null, |m| name_or_null(m, "category"))),
    ];
    for key in RANGE_META {
        fields.push((key, meta.map_or(Value::Null, |m| field_or_null(m, key))));
    }
    for key in ZEROED_META {
        let value = meta
            .and_then(|m| m.get(key))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from(0));
        fields.push((key, value));
    }
    object(fields)
}

/// TM/HM item teaching this move in the target generation's games.
///
/// A failed machine lookup leaves the field empty rather than failing the move.
async fn machine(projector: &Projector, raw: &Document) -> Option<String> {
    let groups = projector.catalog().version_groups(projector.target());
    let entry = raw.array_field("machines").iter().find(|entry| {
        ref_name(entry, "version_group").is_some_and(|vg| groups.iter().any(|g| g == vg))
    })?;
    let url = entry
        .get("machine")
        .and_then(|m| m.get("url"))
        .and_then(Value::as_str)?;

    match projector.source().fetch_url(url).await {
        Ok(machine) => machine.ref_name("item").map(str::to_string),
        Err(e) => {
            warn!("Could not fetch machine {}: {}", url, e);
            None
        },
    }
}
