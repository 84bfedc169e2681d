//! # pokedb-core
//!
//! Core functionality for pokedb - a builder of generation-accurate snapshots
//! of the PokéAPI.
//!
//! The canonical source only describes the present. This crate rewinds it:
//! current-state documents are projected into per-kind shapes, rolled back to
//! a target generation using per-entity change logs, pruned of anything
//! introduced later, and written out as one directory per generation.
//!
//! ## Architecture
//!
//! - **Fetching**: a request-coalescing, memoizing [`FetchCache`] in front of
//!   an HTTP [`Transport`], shared by every task of a run
//! - **History**: [`ChangeLog`]s from [`ChangeLogProvider`]s, applied by the
//!   [`ReconciliationEngine`]
//! - **Pruning**: the [`GenerationFilter`] drops substructures whose
//!   `introduced_at` marker is later than the target
//! - **Orchestration**: the [`Collector`] fans entity tasks out over a
//!   bounded pool and writes summaries, the index and a run report
//!
//! ## Quick Start
//!
//! ```rust
//! use pokedb_core::{Document, Generation, GenerationFilter};
//! use serde_json::json;
//!
//! let eevee = Document::new(json!({
//!     "name": "eevee",
//!     "evolves_to": [
//!         {"species_name": "vaporeon", "introduced_at": 1},
//!         {"species_name": "espeon", "introduced_at": 2}
//!     ]
//! }));
//!
//! let gen1 = GenerationFilter::new(Generation::new(1)).filter(&eevee);
//! assert_eq!(gen1.array_field("evolves_to").len(), 1);
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Per-entity errors never abort
//! a run; they are recorded with their [`Error::category`]:
//!
//! ```rust
//! use pokedb_core::{ChangeLog, Document, Generation, ReconciliationEngine};
//! use serde_json::json;
//!
//! let engine = ReconciliationEngine::new(Generation::new(9));
//! let togepi = Document::new(json!({"name": "togepi", "introduced_at": 2}));
//! match engine.reconcile(&togepi, &ChangeLog::empty("togepi"), Generation::new(1)) {
//!     Err(e) if e.is_skip() => println!("left out: {e}"),
//!     Err(e) => eprintln!("failed: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

/// Request-coalescing document cache
pub mod cache;
/// Change events, change logs and their providers
pub mod changelog;
/// Snapshot orchestration, summaries and run reports
pub mod collect;
/// Configuration loading and validation
pub mod config;
/// Schemaless document trees and field paths
pub mod document;
/// Error types and result aliases
pub mod error;
/// HTTP transport
pub mod fetcher;
pub mod filter;
pub mod project;
pub mod reconcile;
/// Canonical source client and generation catalog
pub mod source;
/// Snapshot output layout and atomic writes
pub mod storage;
/// Core identifiers
pub mod types;

// Re-export commonly used types
pub use cache::{CachePolicy, CacheStats, FetchCache, FetchError, RetryPolicy};
pub use changelog::{
    ChangeEvent, ChangeLog, ChangeLogProvider, CompositeProvider, GenerationRange, NoChanges,
    PastValuesProvider, ScrapedChangeLogProvider,
};
pub use collect::{
    CategorySummary, Collector, Index, KindReport, ProgressCallback, RunOutcome, RunReport,
    TaskFailure, TaskOutcome, TaskSkip,
};
pub use config::{CollectConfig, Config, FetchConfig, PathsConfig};
pub use document::{Document, FieldPath, PathSegment};
pub use error::{Error, Result};
pub use fetcher::{HttpFetcher, Transport, TransportError};
pub use filter::GenerationFilter;
pub use project::Projector;
pub use reconcile::ReconciliationEngine;
pub use source::{CanonicalSource, GenerationCatalog};
pub use storage::OutputStorage;
pub use types::*;
