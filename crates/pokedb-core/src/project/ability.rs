use serde_json::Value;

use super::{Projector, generation_ref, required_str, required_u32, text};
use crate::Result;
use crate::document::{Document, INTRODUCED_AT, object};
use crate::types::ResourceId;

pub(super) fn project(projector: &Projector, id: &ResourceId, raw: &Document) -> Result<Document> {
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
        ("is_main_series", raw.field("is_main_series").cloned().unwrap_or(Value::Bool(true))),
        ("effect", text::english(effects, "effect").map_or(Value::Null, Value::from)),
        ("short_effect", text::english(effects, "short_effect").map_or(Value::Null, Value::from)),
        ("flavor_text", flavor_text),
    ];
    if let Some(generation) = generation_ref(raw_value) {
        fields.push((INTRODUCED_AT, Value::from(generation.get())));
    }

    Ok(Document::new(object(fields)))
}
