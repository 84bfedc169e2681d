//! CLI error handling with semantic exit codes.
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Snapshot complete |
//! | 1 | `Internal` | Unexpected failure, including output writes |
//! | 2 | `Usage` | Invalid arguments, configuration, or an occupied output directory |
//! | 5 | `Network` | The source could not be enumerated |
//! | 8 | `Partial` | Snapshot written, but some entities failed or the time budget ran out |
//!
//! ```bash
//! pokedb --all --gen 2
//! case $? in
//!     0) echo "complete" ;;
//!     8) echo "partial, see report.json" ;;
//!     *) echo "failed" ;;
//! esac
//! ```

use std::fmt;
use std::process::ExitCode;

use pokedb_core::{Error, RunReport};

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Invalid arguments or configuration (exit code 2).
    Usage = 2,

    /// Network or listing failure (exit code 5).
    ///
    /// Covers the latest-generation probe, the catalog, and any category
    /// whose listing failed during the run.
    Network = 5,

    /// Incomplete snapshot (exit code 8).
    Partial = 8,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Create an `ExitCode` from this category.
    #[must_use]
    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::Network => "network error",
            Self::Partial => "partial snapshot",
        }
    }

    /// Category for a core error raised outside any entity task.
    #[must_use]
    pub const fn from_core(error: &Error) -> Self {
        match error {
            Error::Config(_) => Self::Usage,
            Error::Fetch(_) | Error::Listing { .. } => Self::Network,
            _ => Self::Internal,
        }
    }

    /// Exit status for a finished run; listing failures outrank entity failures.
    #[must_use]
    pub fn from_report(report: &RunReport) -> Option<Self> {
        if report.has_listing_errors() {
            Some(Self::Network)
        } else if report.partial {
            Some(Self::Partial)
        } else {
            None
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Internal, source)
    }

    /// Create a usage error.
    pub fn usage(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Usage, source)
    }

    /// Create a network error.
    pub fn network(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Network, source)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }

    /// Create an `ExitCode` from this error.
    #[must_use]
    pub fn as_exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }
}

impl From<Error> for CliError {
    fn from(error: Error) -> Self {
        Self::new(ErrorCategory::from_core(&error), error)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pokedb_core::{FetchError, Generation, KindReport, ResourceKind};

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorCategory::Internal.exit_code(), 1);
        assert_eq!(ErrorCategory::Usage.exit_code(), 2);
        assert_eq!(ErrorCategory::Network.exit_code(), 5);
        assert_eq!(ErrorCategory::Partial.exit_code(), 8);
    }

    #[test]
    fn test_core_errors_map_to_categories() {
        let fetch = Error::Fetch(FetchError::Upstream {
            status: 503,
            key: "https://pokeapi.co/api/v2/generation/".into(),
        });
        assert_eq!(ErrorCategory::from_core(&fetch), ErrorCategory::Network);
        assert_eq!(
            ErrorCategory::from_core(&Error::Config("bad".into())),
            ErrorCategory::Usage
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Storage("disk full".into())),
            ErrorCategory::Internal
        );

        let err = CliError::from(fetch);
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_report_status_precedence() {
        let mut report = RunReport::new(Generation::new(1));
        assert_eq!(ErrorCategory::from_report(&report), None);

        report.record(
            ResourceKind::Move,
            KindReport {
                written: 3,
                failed: 1,
                ..KindReport::default()
            },
            &[],
            &[],
        );
        assert_eq!(
            ErrorCategory::from_report(&report),
            Some(ErrorCategory::Partial)
        );

        report.record(
            ResourceKind::Item,
            KindReport {
                listing_error: Some("Listing item failed".into()),
                ..KindReport::default()
            },
            &[],
            &[],
        );
        assert_eq!(
            ErrorCategory::from_report(&report),
            Some(ErrorCategory::Network)
        );
    }
}
