//! Reconstruct an entity's attributes at a past generation.
//!
//! Starting from the current-state document, each field's events are walked
//! from newest to oldest. Every event that took effect after the target
//! generation is undone (its `old_value` becomes the field's value); the first
//! event already in effect at the target ends the walk. Fields are independent
//! of each other, and fields without events keep their current value.

use serde_json::Value;
use tracing::debug;

use crate::changelog::{ChangeEvent, ChangeLog};
use crate::document::Document;
use crate::types::Generation;
use crate::{Error, Result};

/// Applies change logs to current-state documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationEngine {
    latest: Generation,
}

impl ReconciliationEngine {
    /// Engine for a run whose most recent generation is `latest`.
    pub const fn new(latest: Generation) -> Self {
        Self { latest }
    }

    /// Most recent generation known to the engine.
    pub const fn latest(&self) -> Generation {
        self.latest
    }

    /// The document as it stood in `target`.
    ///
    /// Returns the input unchanged when `target` is the latest generation or
    /// newer, and [`Error::NotYetIntroduced`] when the root marker says the
    /// entity did not exist yet.
    pub fn reconcile(
        &self,
        current: &Document,
        log: &ChangeLog,
        target: Generation,
    ) -> Result<Document> {
        if let Some(introduced_at) = current.introduced_at() {
            if target < introduced_at {
                return Err(Error::NotYetIntroduced {
                    target_generation: target,
                    introduced_at,
                });
            }
        }

        if target >= self.latest || log.is_empty() {
            return Ok(current.clone());
        }

        log.validate(self.latest)?;

        let mut document = current.clone();
        let mut undone = 0usize;
        for (path, events) in log.by_path() {
            let Some(value) = value_at(&events, target) else {
                continue;
            };
            document
                .set_path(path, value.clone())
                .map_err(|e| Error::malformed(log.entity(), e.to_string()))?;
            undone += 1;
        }

        debug!(
            "reconciled {} to generation {} ({} fields rewound)",
            log.entity(),
            target,
            undone
        );
        Ok(document)
    }
}

/// Value a field had in `target`, if any event has to be undone.
///
/// `events` must be one field's events, most recent first.
pub fn value_at<'a>(events: &[&'a ChangeEvent], target: Generation) -> Option<&'a Value> {
    let mut value = None;
    for event in events {
        if event.range.from > target {
            value = Some(&event.old_value);
        } else {
            break;
        }
    }
    value
}
