//! Error types for the migration engine
//!
//! Every failure is surfaced to the caller as-is. Nothing in the engine
//! retries: after a partial failure a retry could apply a change twice.

use std::path::PathBuf;
use thiserror::Error;

use crate::migrations::Version;
use migshift_core::ConfigError;

/// Result type alias for engine operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Failed to read migrations directory '{}': {source}", path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read the migration ledger: {message}")]
    LedgerRead { message: String },

    #[error("Failed to write the migration ledger: {message}")]
    LedgerWrite { message: String },

    #[error("No migration script found for version {version}")]
    ScriptNotFound { version: Version },

    #[error("Failed to rename '{}' to '{}': {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inconsistent migration state: {message}")]
    InconsistentState {
        message: String,
        orphaned_versions: Vec<Version>,
    },

    #[error(
        "Migration {old_version} was renamed to version {new_version} ('{}') but the ledger \
         was not updated: {source}. Reconcile the ledger manually.",
        path.display()
    )]
    ReorderIncomplete {
        old_version: Version,
        new_version: Version,
        path: PathBuf,
        #[source]
        source: Box<MigrateError>,
    },

    #[error(
        "Duplicate migration version {version}: '{}' and '{}'",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        version: Version,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid migration filename '{}': {reason}", path.display())]
    InvalidFilename { path: PathBuf, reason: String },

    #[error("Failed to write '{}': {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration {version} failed: {message}")]
    Execution { version: Version, message: String },

    #[error("Version {version} is the largest representable version")]
    VersionOverflow { version: Version },

    #[error("Operation aborted: {reason}")]
    Aborted { reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MigrateError {
    /// Create a ledger read error
    pub fn ledger_read(message: impl std::fmt::Display) -> Self {
        Self::LedgerRead {
            message: message.to_string(),
        }
    }

    /// Create a ledger write error
    pub fn ledger_write(message: impl std::fmt::Display) -> Self {
        Self::LedgerWrite {
            message: message.to_string(),
        }
    }

    /// Create an execution error for a migration version
    pub fn execution(version: Version, message: impl std::fmt::Display) -> Self {
        Self::Execution {
            version,
            message: message.to_string(),
        }
    }

    /// Create an aborted error
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Check if the error is a missing script
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ScriptNotFound { .. })
    }

    /// True when disk and ledger may disagree and need manual attention
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            Self::InconsistentState { .. } | Self::ReorderIncomplete { .. }
        )
    }
}
