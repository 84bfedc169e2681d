//! Change logs from scraped per-species records.
//!
//! The scraper stores one JSON file per species, `<dir>/<species>.json`:
//!
//! ```json
//! {
//!   "metadata": {"name": "pikachu", "source": "https://..."},
//!   "changes": [
//!     {"generations": [1, 2, 3, 4, 5], "change": {"stats": {"defense": 30}}},
//!     {"generations": [1], "change": {"stats": {"special": 50}}}
//!   ]
//! }
//! ```
//!
//! Each record states the value a field had during a run of generations.
//! A record's generations must be consecutive, and records for one field must
//! follow each other without gaps. Records repeating the exact generations of
//! an earlier one replace its values; any other overlap makes the log
//! malformed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use super::{ChangeEvent, ChangeLog, ChangeLogProvider, chain};
use crate::document::{Document, FieldPath};
use crate::types::{Generation, ResourceId, ResourceKind};
use crate::{Error, Result};

/// Contents of one scraped record file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecords {
    /// Free-form provenance
    #[serde(default)]
    pub metadata: Value,
    /// Value-over-generations records
    #[serde(default)]
    pub changes: Vec<ScrapedRecord>,
}

/// One "during these generations the field was X" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    /// Generations the values applied in
    pub generations: Vec<u32>,
    /// Field values, keyed the way the scraper names them
    pub change: Map<String, Value>,
}

/// Values one record assigns, with the generations they held in.
struct Span {
    first: u32,
    last: u32,
    value: Value,
}

impl ScrapedRecords {
    /// Convert the records into change events against `current`.
    pub fn into_events(
        self,
        entity: &str,
        current: &Document,
        latest: Generation,
    ) -> Result<Vec<ChangeEvent>> {
        let mut spans: BTreeMap<FieldPath, Vec<Span>> = BTreeMap::new();

        for record in self.changes {
            let mut generations = record.generations;
            generations.sort_unstable();
            generations.dedup();
            let (Some(&first), Some(&last)) = (generations.first(), generations.last()) else {
                continue;
            };
            if generations.windows(2).any(|pair| pair[1] != pair[0] + 1) {
                return Err(Error::malformed(
                    entity,
                    format!("record for generations {generations:?} is not contiguous"),
                ));
            }
            for (path, value) in field_values(&record.change, current) {
                let path_spans = spans.entry(path).or_default();
                match path_spans
                    .iter_mut()
                    .find(|span| span.first == first && span.last == last)
                {
                    Some(span) => span.value = value,
                    None => path_spans.push(Span { first, last, value }),
                }
            }
        }

        let mut events = Vec::new();
        for (path, mut spans) in spans {
            spans.sort_by_key(|span| span.first);
            for pair in spans.windows(2) {
                let (earlier, later) = (&pair[0], &pair[1]);
                if later.first <= earlier.last {
                    return Err(Error::malformed(
                        entity,
                        format!(
                            "{path}: records for generations {}-{} and {}-{} overlap",
                            earlier.first, earlier.last, later.first, later.last
                        ),
                    ));
                }
                if later.first != earlier.last + 1 {
                    return Err(Error::malformed(
                        entity,
                        format!(
                            "{path}: no record between generations {} and {}",
                            earlier.last, later.first
                        ),
                    ));
                }
            }

            let points: Vec<(Generation, Value)> = spans
                .into_iter()
                .filter(|span| span.last < latest.get())
                .map(|span| (Generation::new(span.last + 1), span.value))
                .collect();
            let now = current.get_path(&path).cloned().unwrap_or(Value::Null);
            events.extend(chain(&path, points, &now));
        }

        Ok(events)
    }
}

/// Expand a record's `change` mapping into document paths.
fn field_values(change: &Map<String, Value>, current: &Document) -> Vec<(FieldPath, Value)> {
    let mut values = Vec::new();
    for (key, value) in change {
        match key.as_str() {
            "ability" => {
                let Some(name) = value.as_str() else { continue };
                match first_regular_ability(current) {
                    Some(index) => values.push((
                        FieldPath::keys(["abilities"]).index(index).key("name"),
                        Value::from(slug(name)),
                    )),
                    None => debug!("no regular ability to apply '{}' to", name),
                }
            },
            "types" => {
                let types = value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|t| Value::from(slug(t)))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                values.push((FieldPath::keys(["types"]), Value::Array(types)));
            },
            "stats" => {
                let Some(stats) = value.as_object() else { continue };
                for (stat, base) in stats {
                    if stat == "special" {
                        for split in ["special-attack", "special-defense"] {
                            values.push((FieldPath::keys(["stats", split]), base.clone()));
                        }
                    } else {
                        values.push((FieldPath::keys(["stats", stat.as_str()]), base.clone()));
                    }
                }
            },
            "ev_yield" | "base_experience" | "base_happiness" | "capture_rate" => {
                values.push((FieldPath::keys([key.as_str()]), value.clone()));
            },
            other => debug!("ignoring unknown scraped field '{}'", other),
        }
    }
    values
}

fn first_regular_ability(current: &Document) -> Option<usize> {
    current
        .array_field("abilities")
        .iter()
        .position(|a| !a.get("is_hidden").and_then(Value::as_bool).unwrap_or(false))
}

fn slug(display: &str) -> String {
    display
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Reads `<dir>/<species>.json` record files.
pub struct ScrapedChangeLogProvider {
    dir: PathBuf,
    latest: Generation,
}

impl ScrapedChangeLogProvider {
    /// Provider over the record files in `dir`.
    pub fn new(dir: impl Into<PathBuf>, latest: Generation) -> Self {
        Self {
            dir: dir.into(),
            latest,
        }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl ChangeLogProvider for ScrapedChangeLogProvider {
    async fn changes_for(&self, id: &ResourceId, current: &Document) -> Result<ChangeLog> {
        if id.kind != ResourceKind::Species {
            return Ok(ChangeLog::empty(&id.name));
        }

        let path = self.record_path(&id.name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ChangeLog::empty(&id.name));
            },
            Err(e) => return Err(Error::Io(e)),
        };

        let records: ScrapedRecords = serde_json::from_str(&content).map_err(|e| {
            Error::malformed(&id.name, format!("unreadable records in {}: {e}", path.display()))
        })?;
        debug!("{} scraped records for {}", records.changes.len(), id.name);

        let events = records.into_events(&id.name, current, self.latest)?;
        Ok(ChangeLog::new(&id.name, events))
    }
}
