//! Orchestrates building one generation snapshot.
//!
//! For each requested kind the collector enumerates identifiers, then runs one
//! task per entity on a bounded pool:
//!
//! ```text
//! fetch + project → change log → reconcile → filter → write
//! ```
//!
//! Task failures are isolated: a failed entity is recorded in the run report
//! and its siblings carry on. Entities that did not exist yet in the target
//! generation are skipped, not failed. Once every task of a kind has settled
//! its summary is written; the index and report follow after the last kind.
//!
//! An optional time budget bounds the run. Tasks not started when it expires
//! are never dispatched, in-flight tasks are abandoned, and everything already
//! written is kept with the index marked partial.

mod index;

pub use index::{
    CategorySummary, Index, IndexMetadata, KindReport, RunReport, TaskFailure, TaskSkip,
};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::changelog::{ChangeLog, ChangeLogProvider};
use crate::filter::GenerationFilter;
use crate::project::{Projector, summary_sprite};
use crate::reconcile::ReconciliationEngine;
use crate::source::{CanonicalSource, GenerationCatalog};
use crate::storage::{INDEX_FILE, OutputStorage, REPORT_FILE};
use crate::types::{Generation, ResourceId, ResourceKind, SummaryRow};
use crate::{Error, Result};

/// Progress callback, called with `(kind, completed, total)`.
///
/// Invoked once with `completed == 0` when a kind starts, then after every
/// settled task.
pub type ProgressCallback = Arc<dyn Fn(ResourceKind, usize, usize) + Send + Sync>;

/// What happened to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Document written
    Written(SummaryRow),
    /// Entity absent from the target generation
    Skipped(TaskSkip),
    /// Collection failed
    Failed(TaskFailure),
    /// Abandoned or never started because the time budget ran out
    Cancelled(ResourceId),
}

/// Result of collecting one kind.
#[derive(Debug, Clone)]
pub struct KindOutcome {
    /// Kind collected
    pub kind: ResourceKind,
    /// Summary as written
    pub summary: CategorySummary,
    /// Failed entities
    pub failures: Vec<TaskFailure>,
    /// Skipped entities
    pub skips: Vec<TaskSkip>,
    /// Cancelled entities
    pub cancelled: Vec<ResourceId>,
}

impl KindOutcome {
    /// Counts for the run report.
    pub fn report(&self) -> KindReport {
        KindReport {
            written: self.summary.count,
            skipped: self.skips.len(),
            failed: self.failures.len(),
            cancelled: self.cancelled.len(),
            listing_error: None,
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Index as written
    pub index: Index,
    /// Report as written
    pub report: RunReport,
}

impl RunOutcome {
    /// Whether any entity failed, was cancelled, or any kind failed to list.
    pub const fn is_partial(&self) -> bool {
        self.report.partial
    }
}

/// Builds one generation snapshot.
pub struct Collector {
    projector: Projector,
    catalog: Arc<GenerationCatalog>,
    changes: Arc<dyn ChangeLogProvider>,
    engine: ReconciliationEngine,
    filter: GenerationFilter,
    storage: Arc<OutputStorage>,
    source: Arc<CanonicalSource>,
    workers: usize,
    deadline: Option<Instant>,
    progress: Option<ProgressCallback>,
}

impl Collector {
    /// Default number of concurrent entity tasks.
    pub const DEFAULT_WORKERS: usize = 16;

    /// Collector writing `target` snapshots into `storage`.
    pub fn new(
        source: Arc<CanonicalSource>,
        catalog: Arc<GenerationCatalog>,
        changes: Arc<dyn ChangeLogProvider>,
        storage: Arc<OutputStorage>,
        target: Generation,
    ) -> Self {
        Self {
            projector: Projector::new(Arc::clone(&source), Arc::clone(&catalog), target),
            engine: ReconciliationEngine::new(catalog.latest()),
            filter: GenerationFilter::new(target),
            catalog,
            changes,
            storage,
            source,
            workers: Self::DEFAULT_WORKERS,
            deadline: None,
            progress: None,
        }
    }

    /// Set the number of concurrent entity tasks (clamped to 1-64).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 64);
        self
    }

    /// Bound the run by `budget`, starting now.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.deadline = budget.map(|b| Instant::now() + b);
        self
    }

    /// Set progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ResourceKind, usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Generation being collected.
    pub const fn target(&self) -> Generation {
        self.filter.target()
    }

    /// Collect every kind in `kinds`, then write the index and report.
    ///
    /// A kind whose listing fails is recorded and skipped. Storage failures
    /// for summaries, index or report abort the run.
    pub async fn run(&self, kinds: &[ResourceKind]) -> Result<RunOutcome> {
        let target = self.target();
        let mut report = RunReport::new(target);
        let mut categories = BTreeMap::new();
        let mut counts = BTreeMap::new();

        let mut seen = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            match self.collect(kind).await {
                Ok(outcome) => {
                    report.record(kind, outcome.report(), &outcome.failures, &outcome.skips);
                    categories.insert(kind, OutputStorage::summary_pointer(kind));
                    counts.insert(kind, outcome.summary.count);
                },
                Err(e @ Error::Listing { .. }) => {
                    error!("{}", e);
                    let kind_report = KindReport {
                        listing_error: Some(e.to_string()),
                        ..KindReport::default()
                    };
                    report.record(kind, kind_report, &[], &[]);
                },
                Err(e) => return Err(e),
            }
        }

        let index = Index {
            metadata: IndexMetadata {
                generation: target,
                latest_generation: self.catalog.latest(),
                version_groups: self.catalog.version_groups(target).to_vec(),
                created_at: Utc::now(),
                counts,
                partial: report.partial,
            },
            categories,
        };
        self.storage.write_json(INDEX_FILE, &index)?;
        self.storage.write_json(REPORT_FILE, &report)?;

        let stats = self.source.cache().stats();
        info!(
            "Generation {} complete: {} written, {} failed, {} skipped ({} requests, {} network calls, {} coalesced)",
            target,
            report.total_written(),
            report.failures.len(),
            report.skips.len(),
            stats.requests,
            stats.network_calls,
            stats.coalesced
        );

        Ok(RunOutcome { index, report })
    }

    /// Collect one kind and write its summary.
    pub async fn collect(&self, kind: ResourceKind) -> Result<KindOutcome> {
        let target = self.target();
        let ids = self
            .source
            .list_resources(kind, target)
            .await
            .map_err(|e| Error::Listing {
                kind,
                source: Box::new(e),
            })?;

        let total = ids.len();
        info!("Collecting {} {} entries for generation {}", total, kind, target);
        if let Some(progress) = &self.progress {
            progress(kind, 0, total);
        }

        let completed = Arc::new(AtomicUsize::new(0));
        let outcomes: Vec<TaskOutcome> = stream::iter(ids)
            .map(|id| {
                let completed = Arc::clone(&completed);
                let progress = self.progress.clone();
                async move {
                    let outcome = self.process(id).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = progress {
                        cb(kind, done, total);
                    }
                    outcome
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        let mut skips = Vec::new();
        let mut cancelled = Vec::new();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Written(row) => rows.push(row),
                TaskOutcome::Skipped(skip) => skips.push(skip),
                TaskOutcome::Failed(failure) => failures.push(failure),
                TaskOutcome::Cancelled(id) => cancelled.push(id),
            }
        }
        failures.sort_by_key(|f| f.id);
        skips.sort_by_key(|s| s.id);
        cancelled.sort();

        let summary = CategorySummary::new(kind, target, rows);
        self.storage
            .write_json(&OutputStorage::summary_pointer(kind), &summary)?;

        if !cancelled.is_empty() {
            warn!("{} {} entries cancelled by the time budget", cancelled.len(), kind);
        }
        info!(
            "{}: {} written, {} skipped, {} failed",
            kind,
            summary.count,
            skips.len(),
            failures.len()
        );

        Ok(KindOutcome {
            kind,
            summary,
            failures,
            skips,
            cancelled,
        })
    }

    /// Run one entity task under the time budget.
    async fn process(&self, id: ResourceId) -> TaskOutcome {
        let result = match self.deadline {
            Some(deadline) if Instant::now() >= deadline => return TaskOutcome::Cancelled(id),
            Some(deadline) => match tokio::time::timeout_at(deadline, self.build(&id)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("{} abandoned at deadline", id);
                    return TaskOutcome::Cancelled(id);
                },
            },
            None => self.build(&id).await,
        };

        match result {
            Ok(Some(row)) => TaskOutcome::Written(row),
            Ok(None) => TaskOutcome::Skipped(TaskSkip::new(
                &id,
                format!("absent from generation {}", self.target()),
            )),
            Err(e) if e.is_skip() => {
                debug!("Skipping {}: {}", id, e);
                TaskOutcome::Skipped(TaskSkip::new(&id, e.to_string()))
            },
            Err(e) => {
                warn!("Failed {}: {}", id, e);
                TaskOutcome::Failed(TaskFailure::new(&id, &e))
            },
        }
    }

    /// Fetch, project, reconcile, filter and write one entity.
    async fn build(&self, id: &ResourceId) -> Result<Option<SummaryRow>> {
        let Some(current) = self.projector.project(id).await? else {
            return Ok(None);
        };

        let log = if self.target() < self.engine.latest() {
            self.changes.changes_for(id, &current).await?
        } else {
            ChangeLog::empty(&id.name)
        };
        let reconciled = self.engine.reconcile(&current, &log, self.target())?;
        let filtered = self.filter.filter(&reconciled);

        let pointer = self.storage.write_entity(id.kind, &id.name, &filtered)?;
        Ok(Some(SummaryRow {
            id: id.id,
            name: id.name.clone(),
            pointer,
            sprite: summary_sprite(id.kind, &filtered),
        }))
    }
}
