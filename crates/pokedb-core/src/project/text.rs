//! Localized text extraction.
//!
//! Text entries in raw documents look like
//! `{"flavor_text": "...", "language": {"name": "en"}, "version_group": {...}}`.
//! Only English entries are used; whitespace (including the form feeds and
//! soft line breaks the source keeps from the games) is collapsed to single
//! spaces.

use serde_json::Value;
use std::collections::HashSet;

use crate::document::{object, ref_name};
use crate::document::{INTRODUCED_AT, RETIRED_AT};
use crate::types::Generation;

const ENGLISH: &str = "en";

/// Collapse every run of whitespace to one space and trim the ends.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_english(entry: &Value) -> bool {
    ref_name(entry, "language") == Some(ENGLISH)
}

/// First non-empty English `key` text among `entries`.
pub fn english(entries: &[Value], key: &str) -> Option<String> {
    entries
        .iter()
        .filter(|entry| is_english(entry))
        .filter_map(|entry| entry.get(key).and_then(Value::as_str))
        .map(clean)
        .find(|text| !text.is_empty())
}

/// English `key` texts tagged by the game they appeared in.
///
/// `scope` names the reference that identifies the game (`version_group` or
/// `version`) and `generation_of` resolves it. Each entry is emitted as
/// `{<scope>: name, text, introduced_at: g, retired_at: g + 1}` so the
/// generation filter keeps exactly the texts of the target generation. The
/// first English text per game wins; games with no known generation are
/// dropped.
pub fn english_by_game<F>(entries: &[Value], key: &str, scope: &str, generation_of: F) -> Value
where
    F: Fn(&str) -> Option<Generation>,
{
    let mut seen = HashSet::new();
    let mut texts = Vec::new();
    for entry in entries.iter().filter(|entry| is_english(entry)) {
        let Some(game) = ref_name(entry, scope) else {
            continue;
        };
        let Some(generation) = generation_of(game) else {
            continue;
        };
        let text = clean(entry.get(key).and_then(Value::as_str).unwrap_or_default());
        if text.is_empty() || !seen.insert(game.to_string()) {
            continue;
        }
        texts.push(object([
            (scope, Value::from(game)),
            ("text", Value::from(text)),
            (INTRODUCED_AT, Value::from(generation.get())),
            (RETIRED_AT, Value::from(generation.next().get())),
        ]));
    }
    Value::Array(texts)
}
