//! Migration Definitions - Core types shared by the migration system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::version::Version;

/// A migration script discovered on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationScript {
    /// Version prefix of the filename
    pub version: Version,
    /// Human-readable name derived from the filename, without the version
    pub name: String,
    /// Path of the script file
    pub path: PathBuf,
}

impl MigrationScript {
    /// File name of the script, e.g. `20200804234040_add_book_author.sql`
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Same script file, tracked under a different ledger version.
    ///
    /// Used when the file has already been renamed but the ledger still
    /// holds the old version.
    pub fn with_ledger_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// Up and down SQL of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSections {
    pub up_sql: String,
    pub down_sql: String,
}

/// Whether a migration's version is in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Applied,
    Pending,
}

impl MigrationState {
    pub fn is_applied(self) -> bool {
        matches!(self, MigrationState::Applied)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Applied => write!(f, "applied"),
            MigrationState::Pending => write!(f, "pending"),
        }
    }
}

/// One row of the status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub version: Version,
    pub name: String,
    pub state: MigrationState,
    /// Set on the applied migration with the highest version, and only there
    pub is_most_recently_applied: bool,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.state.is_applied()
    }
}

/// Result of running migrations forward
#[derive(Debug, Clone, Default)]
pub struct MigrationRunResult {
    /// Versions that were applied, in order
    pub applied: Vec<Version>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    /// Versions that were reverted, in order
    pub rolled_back: Vec<Version>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// What a bring-to-top operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderOutcome {
    pub old_version: Version,
    pub new_version: Version,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    /// State of the migration before and after the move
    pub state: MigrationState,
    /// True when the migration was reverted and re-applied
    pub rerun: bool,
}

/// Comparison of the ledger against the script directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub script_count: usize,
    pub applied_count: usize,
    /// Ledger versions with no script on disk
    pub orphaned_versions: Vec<Version>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_versions.is_empty()
    }
}
