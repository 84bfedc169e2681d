//! Schemaless document trees and field paths.
//!
//! Raw, reconciled and filtered documents share one shape: a JSON tree of
//! scalars, sequences and mappings. Typed access happens at the edges through
//! the helpers here rather than through per-kind structs, so the reconciler
//! and filter stay generic over every resource kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::types::Generation;

/// Marker key holding the first generation a substructure exists in.
pub const INTRODUCED_AT: &str = "introduced_at";

/// Marker key holding the first generation a substructure no longer exists in.
pub const RETIRED_AT: &str = "retired_at";

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position in a sequence
    Index(usize),
    /// Key in a mapping
    Key(String),
}

/// Ordered path from a document root to one value.
///
/// Serialized as a JSON array such as `["abilities", 0, "name"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Empty path (the document root).
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Path made of mapping keys only.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| PathSegment::Key(k.into())).collect())
    }

    /// Append a mapping key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    /// Append a sequence index.
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    /// The path's segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A field path could not be resolved against a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("path '{path}' does not resolve: {reason}")]
pub struct PathError {
    /// Path that failed
    pub path: FieldPath,
    /// Which step failed and why
    pub reason: String,
}

/// A schemaless entity document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Wrap a JSON value.
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying tree.
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Mutably borrow the underlying tree.
    pub const fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    /// Unwrap into the underlying tree.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Top-level non-negative integer field that fits in `u32`.
    pub fn u32_field(&self, key: &str) -> Option<u32> {
        self.0.get(key).and_then(as_u32)
    }

    /// Top-level array field, empty when absent or not an array.
    pub fn array_field(&self, key: &str) -> &[Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// `name` of a nested named reference (`{"type": {"name": "fire"}}`).
    pub fn ref_name(&self, key: &str) -> Option<&str> {
        ref_name(&self.0, key)
    }

    /// The entity's `name` field.
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// The entity's `id` field.
    pub fn id(&self) -> Option<u32> {
        self.u32_field("id")
    }

    /// Generation the entity first appears in, from the root marker.
    pub fn introduced_at(&self) -> Option<Generation> {
        marker(&self.0, INTRODUCED_AT)
    }

    /// Resolve a path to a value.
    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(&self.0, |node, segment| match segment {
                PathSegment::Key(key) => node.get(key.as_str()),
                PathSegment::Index(index) => node.get(*index),
            })
    }

    /// Replace the value at `path`.
    ///
    /// Every parent must already exist. A missing final key in a mapping is
    /// inserted; a sequence index must be in bounds.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), PathError> {
        let Some((last, parents)) = path.segments().split_last() else {
            self.0 = value;
            return Ok(());
        };

        let fail = |reason: String| PathError {
            path: path.clone(),
            reason,
        };

        let mut node = &mut self.0;
        for segment in parents {
            node = match segment {
                PathSegment::Key(key) => node
                    .get_mut(key.as_str())
                    .ok_or_else(|| fail(format!("missing key '{key}'")))?,
                PathSegment::Index(index) => node
                    .get_mut(*index)
                    .ok_or_else(|| fail(format!("index {index} out of bounds")))?,
            };
        }

        match last {
            PathSegment::Key(key) => {
                let map = node
                    .as_object_mut()
                    .ok_or_else(|| fail(format!("parent of '{key}' is not a mapping")))?;
                map.insert(key.clone(), value);
            },
            PathSegment::Index(index) => {
                let slot = node
                    .as_array_mut()
                    .and_then(|items| items.get_mut(*index))
                    .ok_or_else(|| fail(format!("index {index} out of bounds")))?;
                *slot = value;
            },
        }
        Ok(())
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Read a generation marker from a mapping node.
pub fn marker(node: &Value, key: &str) -> Option<Generation> {
    node.as_object()
        .and_then(|map| map.get(key))
        .and_then(as_u32)
        .map(Generation::new)
}

/// Set a generation marker on a mapping node; non-mappings are left alone.
pub fn set_marker(node: &mut Value, key: &str, generation: Generation) {
    if let Some(map) = node.as_object_mut() {
        map.insert(key.to_string(), Value::from(generation.get()));
    }
}

/// `name` of the named reference stored under `key`.
pub fn ref_name<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key)
        .and_then(|reference| reference.get("name"))
        .and_then(Value::as_str)
}

/// Numeric id from a canonical resource URL (`.../move/33/` → 33).
pub fn id_from_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// Interpret a JSON number as `u32`.
pub fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Build a mapping from `(key, value)` pairs.
pub fn object<I, K>(entries: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    Value::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<Map<String, Value>>(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::new(json!({
            "id": 25,
            "name": "pikachu",
            "introduced_at": 1,
            "types": ["electric"],
            "stats": {"hp": 35, "defense": 40},
            "abilities": [
                {"name": "static", "is_hidden": false},
                {"name": "lightning-rod", "is_hidden": true, "introduced_at": 5}
            ]
        }))
    }

    #[test]
    fn test_get_path() {
        let doc = sample();
        let path = FieldPath::keys(["stats", "hp"]);
        assert_eq!(doc.get_path(&path), Some(&json!(35)));

        let ability = FieldPath::keys(["abilities"]).index(1).key("name");
        assert_eq!(doc.get_path(&ability), Some(&json!("lightning-rod")));
        assert_eq!(doc.get_path(&FieldPath::keys(["missing"])), None);
    }

    #[test]
    fn test_set_path_replaces_and_inserts() {
        let mut doc = sample();
        doc.set_path(&FieldPath::keys(["stats", "defense"]), json!(30))
            .unwrap();
        doc.set_path(&FieldPath::keys(["stats", "special"]), json!(50))
            .unwrap();
        assert_eq!(doc.as_value()["stats"], json!({"hp": 35, "defense": 30, "special": 50}));
    }

    #[test]
    fn test_set_path_rejects_missing_parent_and_bad_index() {
        let mut doc = sample();
        let err = doc
            .set_path(&FieldPath::keys(["nope", "hp"]), json!(1))
            .unwrap_err();
        assert!(err.reason.contains("nope"));

        let out_of_bounds = FieldPath::keys(["abilities"]).index(7).key("name");
        assert!(doc.set_path(&out_of_bounds, json!("x")).is_err());
    }

    #[test]
    fn test_field_path_serde_and_display() {
        let path = FieldPath::keys(["abilities"]).index(0).key("name");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["abilities",0,"name"]"#);
        let back: FieldPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert_eq!(path.to_string(), "abilities[0].name");
        assert_eq!(FieldPath::root().to_string(), "$");
    }

    #[test]
    fn test_markers_and_accessors() {
        let doc = sample();
        assert_eq!(doc.introduced_at(), Some(Generation::new(1)));
        assert_eq!(doc.name(), Some("pikachu"));
        assert_eq!(doc.id(), Some(25));
        assert_eq!(doc.array_field("types").len(), 1);
        assert!(doc.array_field("moves").is_empty());

        let mut node = json!({"name": "x"});
        set_marker(&mut node, RETIRED_AT, Generation::new(3));
        assert_eq!(marker(&node, RETIRED_AT), Some(Generation::new(3)));
    }

    #[test]
    fn test_id_from_url() {
        assert_eq!(id_from_url("https://pokeapi.co/api/v2/move/33/"), Some(33));
        assert_eq!(id_from_url("https://pokeapi.co/api/v2/move/33"), Some(33));
        assert_eq!(id_from_url("https://pokeapi.co/api/v2/move/"), None);
    }
}
