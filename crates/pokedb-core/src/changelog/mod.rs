//! Historical change records.
//!
//! A [`ChangeEvent`] says that, starting at `range.from`, the value at
//! `field_path` became `new_value`, replacing `old_value`. For one path the
//! events of an entity form a chain: the newest is open-ended, each older
//! event ends exactly where the next one begins, and each older event's
//! `new_value` is the next event's `old_value`.
//!
//! Change logs come from [`ChangeLogProvider`]s: the canonical source's own
//! history fields ([`PastValuesProvider`]) and scraped records stored as JSON
//! files ([`ScrapedChangeLogProvider`]).

mod past_values;
mod provider;
mod scraped;

pub use past_values::PastValuesProvider;
pub use provider::{ChangeLogProvider, CompositeProvider, NoChanges};
pub use scraped::{ScrapedChangeLogProvider, ScrapedRecord, ScrapedRecords};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::document::FieldPath;
use crate::types::Generation;
use crate::{Error, Result};

/// Half-open generation interval `[from, to)`; `to = None` means "still current".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRange {
    /// First generation the new value holds in
    pub from: Generation,
    /// First generation it no longer holds in
    #[serde(default)]
    pub to: Option<Generation>,
}

impl GenerationRange {
    /// Range that is still current.
    pub const fn open(from: Generation) -> Self {
        Self { from, to: None }
    }

    /// Range closed at `to`.
    pub const fn bounded(from: Generation, to: Generation) -> Self {
        Self { from, to: Some(to) }
    }

    /// Whether `generation` falls inside the range.
    pub fn contains(&self, generation: Generation) -> bool {
        generation >= self.from && self.to.is_none_or(|to| generation < to)
    }
}

impl fmt::Display for GenerationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {})", self.from, to),
            None => write!(f, "[{}, ..)", self.from),
        }
    }
}

/// One dated change to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Field the change applies to
    pub field_path: FieldPath,
    /// Generations in which `new_value` holds
    pub range: GenerationRange,
    /// Value before the change
    pub old_value: Value,
    /// Value from `range.from` on
    pub new_value: Value,
}

/// Change events for one entity, most recent first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    entity: String,
    events: Vec<ChangeEvent>,
}

impl ChangeLog {
    /// Build a log; events are normalized to most-recent-first order.
    pub fn new(entity: impl Into<String>, mut events: Vec<ChangeEvent>) -> Self {
        events.sort_by(|a, b| b.range.from.cmp(&a.range.from));
        Self {
            entity: entity.into(),
            events,
        }
    }

    /// A log with no events.
    pub fn empty(entity: impl Into<String>) -> Self {
        Self::new(entity, Vec::new())
    }

    /// Entity name the log belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Events, most recent first.
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Merge another log's events into this one; events already present are skipped.
    pub fn merge(&mut self, other: Self) {
        for event in other.events {
            if !self.events.contains(&event) {
                self.events.push(event);
            }
        }
        self.events.sort_by(|a, b| b.range.from.cmp(&a.range.from));
    }

    /// Merge another log whose events take precedence: for every path `other`
    /// covers, this log's events at that path are dropped first.
    ///
    /// Returns the number of events replaced.
    pub fn overlay(&mut self, other: Self) -> usize {
        let covered: BTreeSet<&FieldPath> = other.events.iter().map(|e| &e.field_path).collect();
        let before = self.events.len();
        self.events.retain(|e| !covered.contains(&e.field_path));
        let replaced = before - self.events.len();
        self.merge(other);
        replaced
    }

    /// Events grouped by field path, each group most recent first.
    pub fn by_path(&self) -> BTreeMap<&FieldPath, Vec<&ChangeEvent>> {
        let mut groups: BTreeMap<&FieldPath, Vec<&ChangeEvent>> = BTreeMap::new();
        for event in &self.events {
            groups.entry(&event.field_path).or_default().push(event);
        }
        groups
    }

    /// Check that every path's events form a consistent chain.
    pub fn validate(&self, latest: Generation) -> Result<()> {
        for (path, events) in self.by_path() {
            for event in &events {
                let range = event.range;
                if range.from.get() == 0 {
                    return Err(self.malformed(path, "generation 0 does not exist"));
                }
                if range.from > latest {
                    return Err(self.malformed(
                        path,
                        &format!("change at generation {} is after latest {latest}", range.from),
                    ));
                }
                if range.to.is_some_and(|to| to <= range.from) {
                    return Err(self.malformed(path, &format!("empty range {range}")));
                }
            }

            if let Some(newest) = events.first() {
                if newest.range.to.is_some() {
                    return Err(self.malformed(
                        path,
                        &format!("newest change {} is not open-ended", newest.range),
                    ));
                }
            }

            for pair in events.windows(2) {
                let (newer, older) = (pair[0], pair[1]);
                match older.range.to {
                    Some(to) if to == newer.range.from => {},
                    Some(to) if to < newer.range.from => {
                        return Err(self.malformed(
                            path,
                            &format!(
                                "gap between {} and {}",
                                older.range, newer.range
                            ),
                        ));
                    },
                    _ => {
                        return Err(self.malformed(
                            path,
                            &format!(
                                "{} overlaps {}",
                                older.range, newer.range
                            ),
                        ));
                    },
                }
                if older.new_value != newer.old_value {
                    return Err(self.malformed(
                        path,
                        &format!(
                            "value {} set at generation {} contradicts {} replaced at generation {}",
                            older.new_value, older.range.from, newer.old_value, newer.range.from
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn malformed(&self, path: &FieldPath, reason: &str) -> Error {
        Error::malformed(&self.entity, format!("{path}: {reason}"))
    }
}

/// Build a consistent event chain for one field.
///
/// Each point is `(from, old_value)`: the generation a change took effect and
/// the value it replaced. Points are ordered by generation; a repeated
/// generation keeps its first point. Each event's `new_value` is the next
/// point's `old_value`, and the last event's is `current`.
pub fn chain(
    path: &FieldPath,
    mut points: Vec<(Generation, Value)>,
    current: &Value,
) -> Vec<ChangeEvent> {
    points.sort_by_key(|(from, _)| *from);
    points.dedup_by_key(|(from, _)| *from);

    let mut events = Vec::with_capacity(points.len());
    let mut iter = points.into_iter().peekable();
    while let Some((from, old_value)) = iter.next() {
        let (to, new_value) = match iter.peek() {
            Some((next_from, next_old)) => (Some(*next_from), next_old.clone()),
            None => (None, current.clone()),
        };
        events.push(ChangeEvent {
            field_path: path.clone(),
            range: GenerationRange { from, to },
            old_value,
            new_value,
        });
    }
    events
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn g(n: u32) -> Generation {
        Generation::new(n)
    }

    fn event(path: &[&str], from: u32, to: Option<u32>, old: Value, new: Value) -> ChangeEvent {
        ChangeEvent {
            field_path: FieldPath::keys(path.iter().copied()),
            range: GenerationRange {
                from: g(from),
                to: to.map(g),
            },
            old_value: old,
            new_value: new,
        }
    }

    #[test]
    fn test_events_sorted_most_recent_first() {
        let log = ChangeLog::new(
            "pikachu",
            vec![
                event(&["stats", "defense"], 2, Some(6), json!(30), json!(40)),
                event(&["stats", "defense"], 6, None, json!(40), json!(50)),
            ],
        );
        let froms: Vec<u32> = log.events().iter().map(|e| e.range.from.get()).collect();
        assert_eq!(froms, [6, 2]);
        assert!(log.validate(g(9)).is_ok());
    }

    #[test]
    fn test_gap_is_malformed() {
        let log = ChangeLog::new(
            "pikachu",
            vec![
                event(&["stats", "hp"], 2, Some(4), json!(30), json!(35)),
                event(&["stats", "hp"], 6, None, json!(35), json!(40)),
            ],
        );
        let err = log.validate(g(9)).unwrap_err();
        assert!(matches!(err, Error::MalformedChangeLog { .. }));
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn test_overlap_is_malformed() {
        let log = ChangeLog::new(
            "gust",
            vec![
                event(&["type"], 1, None, json!("normal"), json!("flying")),
                event(&["type"], 2, None, json!("flying"), json!("flying")),
            ],
        );
        assert!(log.validate(g(9)).unwrap_err().to_string().contains("overlaps"));
    }

    #[test]
    fn test_contradiction_is_malformed() {
        let log = ChangeLog::new(
            "tackle",
            vec![
                event(&["power"], 5, Some(7), json!(35), json!(50)),
                event(&["power"], 7, None, json!(45), json!(40)),
            ],
        );
        assert!(log.validate(g(9)).unwrap_err().to_string().contains("contradicts"));
    }

    #[test]
    fn test_bounded_newest_and_out_of_range_generations() {
        let bounded = ChangeLog::new(
            "tackle",
            vec![event(&["power"], 5, Some(7), json!(35), json!(50))],
        );
        assert!(bounded.validate(g(9)).is_err());

        let future = ChangeLog::new("tackle", vec![event(&["power"], 12, None, json!(1), json!(2))]);
        assert!(future.validate(g(9)).is_err());

        let zero = ChangeLog::new("tackle", vec![event(&["power"], 0, None, json!(1), json!(2))]);
        assert!(zero.validate(g(9)).is_err());
    }

    #[test]
    fn test_independent_paths_validate_separately() {
        let log = ChangeLog::new(
            "clefairy",
            vec![
                event(&["types"], 6, None, json!(["normal"]), json!(["fairy"])),
                event(&["stats", "hp"], 3, None, json!(60), json!(70)),
            ],
        );
        assert!(log.validate(g(9)).is_ok());
        assert_eq!(log.by_path().len(), 2);
    }

    #[test]
    fn test_merge_skips_identical_events() {
        let mut log = ChangeLog::new(
            "clefairy",
            vec![event(&["types"], 6, None, json!(["normal"]), json!(["fairy"]))],
        );
        log.merge(ChangeLog::new(
            "clefairy",
            vec![
                event(&["types"], 6, None, json!(["normal"]), json!(["fairy"])),
                event(&["stats", "hp"], 3, None, json!(60), json!(70)),
            ],
        ));
        assert_eq!(log.len(), 2);
        assert!(log.validate(g(9)).is_ok());
    }

    #[test]
    fn test_overlay_replaces_covered_paths() {
        let mut log = ChangeLog::new(
            "clefairy",
            vec![
                event(&["types"], 6, None, json!(["normal"]), json!(["fairy"])),
                event(&["stats", "hp"], 3, None, json!(60), json!(70)),
            ],
        );
        let replaced = log.overlay(ChangeLog::new(
            "clefairy",
            vec![
                event(&["types"], 2, Some(6), json!(["psychic"]), json!(["normal"])),
                event(&["types"], 6, None, json!(["normal"]), json!(["fairy"])),
            ],
        ));
        assert_eq!(replaced, 1);
        assert_eq!(log.len(), 3);
        assert!(log.validate(g(9)).is_ok());
        assert_eq!(log.by_path()[&FieldPath::keys(["types"])].len(), 2);
    }

    #[test]
    fn test_chain_links_points() {
        let path = FieldPath::keys(["power"]);
        let events = chain(
            &path,
            vec![(g(6), json!(50)), (g(5), json!(35)), (g(6), json!(99))],
            &json!(40),
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].range, GenerationRange::bounded(g(5), g(6)));
        assert_eq!(events[0].new_value, json!(50));
        assert_eq!(events[1].range, GenerationRange::open(g(6)));
        assert_eq!(events[1].old_value, json!(50));
        assert_eq!(events[1].new_value, json!(40));
        assert!(ChangeLog::new("tackle", events).validate(g(9)).is_ok());
    }

    #[test]
    fn test_range_contains() {
        let range = GenerationRange::bounded(g(2), g(5));
        assert!(range.contains(g(2)));
        assert!(range.contains(g(4)));
        assert!(!range.contains(g(5)));
        assert!(GenerationRange::open(g(3)).contains(g(9)));
    }

    #[test]
    fn test_event_serde_shape() {
        let json = json!({
            "field_path": ["abilities", 0, "name"],
            "range": {"from": 3, "to": null},
            "old_value": "static",
            "new_value": "lightning-rod"
        });
        let event: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.field_path.to_string(), "abilities[0].name");
        assert_eq!(event.range, GenerationRange::open(g(3)));
    }
}
