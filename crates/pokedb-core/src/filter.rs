//! Prune substructures that do not exist in the target generation.
//!
//! Any mapping below the root may carry an `introduced_at` marker, and
//! optionally a `retired_at` marker (exclusive). A marked mapping is kept only
//! when `introduced_at <= target < retired_at`; pruning removes sequence
//! elements and mapping entries alike. Unmarked values are always kept, and
//! the order of what remains is unchanged.

use serde_json::Value;

use crate::document::{Document, INTRODUCED_AT, RETIRED_AT, marker};
use crate::types::Generation;

/// Removes content introduced after, or retired by, a target generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationFilter {
    target: Generation,
}

impl GenerationFilter {
    /// Filter for `target`.
    pub const fn new(target: Generation) -> Self {
        Self { target }
    }

    /// Generation this filter keeps content for.
    pub const fn target(&self) -> Generation {
        self.target
    }

    /// Filtered copy of `document`. The root itself is never pruned.
    pub fn filter(&self, document: &Document) -> Document {
        let mut value = document.as_value().clone();
        self.prune_children(&mut value);
        Document::new(value)
    }

    /// Whether a node survives in the target generation.
    pub fn retains(&self, node: &Value) -> bool {
        let introduced = marker(node, INTRODUCED_AT).is_none_or(|g| g <= self.target);
        let retired = marker(node, RETIRED_AT).is_some_and(|g| g <= self.target);
        introduced && !retired
    }

    fn prune_children(&self, node: &mut Value) {
        match node {
            Value::Array(items) => {
                items.retain(|item| self.retains(item));
                for item in items {
                    self.prune_children(item);
                }
            },
            Value::Object(map) => {
                map.retain(|_, child| self.retains(child));
                for child in map.values_mut() {
                    self.prune_children(child);
                }
            },
            _ => {},
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, json};

    fn g(n: u32) -> Generation {
        Generation::new(n)
    }

    fn eevee() -> Document {
        Document::new(json!({
            "name": "eevee",
            "introduced_at": 1,
            "abilities": [
                {"name": "run-away", "is_hidden": false},
                {"name": "adaptability", "is_hidden": false, "introduced_at": 4},
                {"name": "anticipation", "is_hidden": true, "introduced_at": 5}
            ],
            "evolution_chain": {
                "species_name": "eevee",
                "evolves_to": [
                    {"species_name": "vaporeon", "introduced_at": 1},
                    {"species_name": "espeon", "introduced_at": 2},
                    {"species_name": "leafeon", "introduced_at": 4,
                     "evolves_to": [{"species_name": "nothing", "introduced_at": 9}]},
                    {"species_name": "sylveon", "introduced_at": 6}
                ]
            },
            "moves": [
                {"name": "tackle", "version_group": "red-blue", "introduced_at": 1, "retired_at": 2},
                {"name": "tackle", "version_group": "gold-silver", "introduced_at": 2, "retired_at": 3}
            ],
            "sprites": {"front_default": "https://img/133.png"}
        }))
    }

    fn names(doc: &Document, key: &str) -> Vec<String> {
        doc.array_field(key)
            .iter()
            .map(|v| v["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_prunes_sequence_elements_in_order() {
        let filtered = GenerationFilter::new(g(4)).filter(&eevee());
        assert_eq!(names(&filtered, "abilities"), ["run-away", "adaptability"]);

        let evolutions: Vec<&str> = filtered.as_value()["evolution_chain"]["evolves_to"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["species_name"].as_str().unwrap())
            .collect();
        assert_eq!(evolutions, ["vaporeon", "espeon", "leafeon"]);
        assert_eq!(
            filtered.as_value()["evolution_chain"]["evolves_to"][2]["evolves_to"],
            json!([])
        );
    }

    #[test]
    fn test_retired_entries_are_pruned() {
        let gen1 = GenerationFilter::new(g(1)).filter(&eevee());
        let moves = gen1.array_field("moves");
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0]["version_group"], "red-blue");

        let gen3 = GenerationFilter::new(g(3)).filter(&eevee());
        assert!(gen3.array_field("moves").is_empty());
    }

    #[test]
    fn test_prunes_mapping_entries() {
        let doc = Document::new(json!({
            "name": "x",
            "by_game": {
                "red": {"text": "a", "introduced_at": 1},
                "sword": {"text": "b", "introduced_at": 8}
            }
        }));
        let filtered = GenerationFilter::new(g(3)).filter(&doc);
        assert_eq!(filtered.as_value()["by_game"], json!({"red": {"text": "a", "introduced_at": 1}}));
    }

    #[test]
    fn test_root_and_unmarked_values_survive() {
        let doc = Document::new(json!({"name": "sylveon", "introduced_at": 6, "types": ["fairy"]}));
        let filtered = GenerationFilter::new(g(1)).filter(&doc);
        assert_eq!(filtered, doc);
    }

    #[test]
    fn test_latest_keeps_everything_currently_live() {
        let filtered = GenerationFilter::new(g(9)).filter(&eevee());
        assert_eq!(filtered.array_field("abilities").len(), 3);
        assert!(filtered.array_field("moves").is_empty());
    }

    fn arb_tree() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 48, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                (
                    proptest::collection::btree_map("[a-z]{1,3}", inner, 0..4),
                    proptest::option::of(1u32..=9),
                    proptest::option::of(1u32..=9),
                )
                    .prop_map(|(entries, introduced, retired)| {
                        let mut map: Map<String, Value> = entries.into_iter().collect();
                        if let Some(n) = introduced {
                            map.insert(INTRODUCED_AT.to_string(), Value::from(n));
                        }
                        if let Some(n) = retired {
                            map.insert(RETIRED_AT.to_string(), Value::from(n));
                        }
                        Value::Object(map)
                    }),
            ]
        })
    }

    fn all_children_retained(filter: &GenerationFilter, node: &Value) -> bool {
        let children: Vec<&Value> = match node {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => Vec::new(),
        };
        children
            .into_iter()
            .all(|child| filter.retains(child) && all_children_retained(filter, child))
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(tree in arb_tree(), target in 1u32..=9) {
            let filter = GenerationFilter::new(g(target));
            let once = filter.filter(&Document::new(tree));
            let twice = filter.filter(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(all_children_retained(&filter, once.as_value()));
        }
    }
}
