//! Error types and handling for pokedb-core operations.
//!
//! Errors fall into a few groups:
//!
//! - **Fetch errors**: upstream HTTP failures, exhausted retries, undecodable bodies
//! - **History errors**: a target generation before an entity existed, or a
//!   change log that cannot be applied consistently
//! - **Local errors**: file system, serialization and configuration problems
//!
//! Per-entity failures are captured by the collector and never abort a run on
//! their own. [`Error::category`] gives the stable label used in run reports.
//!
//! ```rust
//! use pokedb_core::{Error, Generation};
//!
//! let err = Error::NotYetIntroduced {
//!     target_generation: Generation::new(2),
//!     introduced_at: Generation::new(4),
//! };
//! assert!(err.is_skip());
//! assert_eq!(err.category(), "not_yet_introduced");
//! ```

use thiserror::Error;

use crate::cache::FetchError;
use crate::types::{Generation, ResourceKind};

/// The main error type for pokedb-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A document could not be retrieved from the canonical source.
    ///
    /// Wraps the shared [`FetchError`] handed to every caller that coalesced
    /// onto the same request.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The requested generation predates the entity's first appearance.
    ///
    /// This is a skip rather than a failure: the entity is simply absent from
    /// the snapshot.
    #[error(
        "Not yet introduced: requested generation {target_generation}, introduced in {introduced_at}"
    )]
    NotYetIntroduced {
        /// Generation the snapshot is being built for
        target_generation: Generation,
        /// First generation the entity appears in
        introduced_at: Generation,
    },

    /// The change log for an entity is internally inconsistent.
    ///
    /// ## Common Causes
    ///
    /// - Overlapping or gapped generation ranges on one field
    /// - An event whose old value contradicts the newer event's new value
    /// - A field path that does not resolve in the current document
    #[error("Malformed change log for '{entity}': {reason}")]
    MalformedChangeLog {
        /// Entity name the log belongs to
        entity: String,
        /// What made the log unusable
        reason: String,
    },

    /// Enumerating a category failed; the whole category is skipped.
    #[error("Listing {kind} failed: {source}")]
    Listing {
        /// Category whose listing failed
        kind: ResourceKind,
        /// Underlying failure
        #[source]
        source: Box<Self>,
    },

    /// A raw document lacked a field needed to build the output shape.
    #[error("Projection failed for '{entity}': {reason}")]
    Projection {
        /// Entity being projected
        entity: String,
        /// Missing or malformed field
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output storage could not be prepared or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The run's time budget elapsed before the task finished.
    #[error("Cancelled: time budget exhausted")]
    Cancelled,

    /// Generic error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable by retrying the run.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_transient(),
            Self::Listing { source, .. } => source.is_recoverable(),
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            Self::Cancelled => true,
            _ => false,
        }
    }

    /// Whether this outcome means "leave the entity out" rather than "failed".
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::NotYetIntroduced { .. })
    }

    /// Stable category label used in run reports.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Fetch(err) => err.category(),
            Self::NotYetIntroduced { .. } => "not_yet_introduced",
            Self::MalformedChangeLog { .. } => "malformed_change_log",
            Self::Listing { .. } => "listing",
            Self::Projection { .. } => "projection",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }

    /// Shorthand for a [`Error::MalformedChangeLog`].
    pub fn malformed(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedChangeLog {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::Projection`].
    pub fn projection(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Projection {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
