//! Summary, index and report records written alongside a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Generation, ResourceId, ResourceKind, SummaryRow};

/// Per-kind listing of the entities written for one generation.
///
/// Rows are ordered by id, so two runs over the same inputs produce the same
/// file regardless of task completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    /// Kind listed
    pub kind: ResourceKind,
    /// Snapshot generation
    pub generation: Generation,
    /// Number of entries
    pub count: usize,
    /// One row per written entity
    pub entries: Vec<SummaryRow>,
}

impl CategorySummary {
    /// Build a summary from rows in any order.
    pub fn new(kind: ResourceKind, generation: Generation, mut entries: Vec<SummaryRow>) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        Self {
            kind,
            generation,
            count: entries.len(),
            entries,
        }
    }
}

/// Snapshot-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Snapshot generation
    pub generation: Generation,
    /// Most recent generation at collection time
    pub latest_generation: Generation,
    /// Version groups belonging to the snapshot's generation
    pub version_groups: Vec<String>,
    /// When the index was written
    pub created_at: DateTime<Utc>,
    /// Entities written per kind
    pub counts: BTreeMap<ResourceKind, usize>,
    /// Whether any entity failed or was cut off by the time budget
    pub partial: bool,
}

/// Top-level `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Snapshot-level metadata
    pub metadata: IndexMetadata,
    /// Relative pointer to each kind's summary
    pub categories: BTreeMap<ResourceKind, String>,
}

/// An entity that failed to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Kind of the entity
    pub kind: ResourceKind,
    /// Entity id
    pub id: u32,
    /// Entity name
    pub name: String,
    /// Stable error category (see `Error::category`)
    pub category: String,
    /// Rendered error
    pub message: String,
}

impl TaskFailure {
    /// Failure record for `id`.
    pub fn new(id: &ResourceId, error: &crate::Error) -> Self {
        Self {
            kind: id.kind,
            id: id.id,
            name: id.name.clone(),
            category: error.category().to_string(),
            message: error.to_string(),
        }
    }
}

/// An entity deliberately left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSkip {
    /// Kind of the entity
    pub kind: ResourceKind,
    /// Entity id
    pub id: u32,
    /// Entity name
    pub name: String,
    /// Why it was left out
    pub reason: String,
}

impl TaskSkip {
    /// Skip record for `id`.
    pub fn new(id: &ResourceId, reason: impl Into<String>) -> Self {
        Self {
            kind: id.kind,
            id: id.id,
            name: id.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Outcome counts for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReport {
    /// Documents written
    pub written: usize,
    /// Entities absent from the generation
    pub skipped: usize,
    /// Entities that failed
    pub failed: usize,
    /// Entities abandoned when the time budget ran out
    pub cancelled: usize,
    /// Set when the kind could not be enumerated at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

impl KindReport {
    /// Whether this kind is incomplete.
    pub const fn is_partial(&self) -> bool {
        self.failed > 0 || self.cancelled > 0 || self.listing_error.is_some()
    }
}

/// `report.json`: what happened to every task of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Snapshot generation
    pub generation: Generation,
    /// Whether any kind is incomplete
    pub partial: bool,
    /// Counts per kind
    pub kinds: BTreeMap<ResourceKind, KindReport>,
    /// Every failed entity, by kind then id
    pub failures: Vec<TaskFailure>,
    /// Every skipped entity, by kind then id
    pub skips: Vec<TaskSkip>,
}

impl RunReport {
    /// Empty report for `generation`.
    pub const fn new(generation: Generation) -> Self {
        Self {
            generation,
            partial: false,
            kinds: BTreeMap::new(),
            failures: Vec::new(),
            skips: Vec::new(),
        }
    }

    /// Record the counts and records of one kind.
    pub fn record(
        &mut self,
        kind: ResourceKind,
        report: KindReport,
        failures: &[TaskFailure],
        skips: &[TaskSkip],
    ) {
        self.partial |= report.is_partial();
        self.kinds.insert(kind, report);
        self.failures.extend_from_slice(failures);
        self.skips.extend_from_slice(skips);
        self.failures.sort_by(|a, b| (a.kind, a.id).cmp(&(b.kind, b.id)));
        self.skips.sort_by(|a, b| (a.kind, a.id).cmp(&(b.kind, b.id)));
    }

    /// Total entities written across kinds.
    pub fn total_written(&self) -> usize {
        self.kinds.values().map(|k| k.written).sum()
    }

    /// Whether any kind could not be enumerated.
    pub fn has_listing_errors(&self) -> bool {
        self.kinds.values().any(|k| k.listing_error.is_some())
    }
}
