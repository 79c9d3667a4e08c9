//! Schema snapshot written after ledger-affecting commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::definitions::MigrationStatus;
use super::version::Version;
use crate::error::{MigrateError, MigrateResult};

/// Regenerates a persisted snapshot of the migration state
pub trait SchemaDumper {
    fn dump(&self, statuses: &[MigrationStatus]) -> MigrateResult<()>;
}

/// Snapshot document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Latest applied version, if any
    pub version: Option<Version>,
    pub migrations: Vec<MigrationStatus>,
}

impl SchemaSnapshot {
    pub fn from_statuses(statuses: &[MigrationStatus]) -> Self {
        Self {
            generated_at: Utc::now(),
            version: statuses
                .iter()
                .find(|status| status.is_most_recently_applied)
                .map(|status| status.version),
            migrations: statuses.to_vec(),
        }
    }
}

/// Writes a [`SchemaSnapshot`] as pretty JSON
#[derive(Debug, Clone)]
pub struct SnapshotDumper {
    path: PathBuf,
}

impl SnapshotDumper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> MigrateError {
        MigrateError::FileWrite {
            path: self.path.clone(),
            source,
        }
    }
}

impl SchemaDumper for SnapshotDumper {
    fn dump(&self, statuses: &[MigrationStatus]) -> MigrateResult<()> {
        let snapshot = SchemaSnapshot::from_statuses(statuses);
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| self.write_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| self.write_error(e))?;

        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| self.write_error(e))?;
        temp.write_all(&bytes).map_err(|e| self.write_error(e))?;
        temp.persist(&self.path).map_err(|e| self.write_error(e.error))?;

        tracing::debug!("Wrote schema snapshot to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::definitions::MigrationState;
    use tempfile::TempDir;

    fn status(version: i64, state: MigrationState, most_recent: bool) -> MigrationStatus {
        MigrationStatus {
            version: Version::new(version),
            name: format!("Step {}", version),
            state,
            is_most_recently_applied: most_recent,
        }
    }

    #[test]
    fn test_dump_records_latest_applied_version() {
        let temp_dir = TempDir::new().unwrap();
        let dumper = SnapshotDumper::new(temp_dir.path().join("db").join("schema.json"));
        let statuses = vec![
            status(10, MigrationState::Applied, false),
            status(31, MigrationState::Applied, true),
            status(40, MigrationState::Pending, false),
        ];

        dumper.dump(&statuses).unwrap();

        let raw = fs::read_to_string(dumper.path()).unwrap();
        let snapshot: SchemaSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.version, Some(Version::new(31)));
        assert_eq!(snapshot.migrations, statuses);
        assert!(raw.contains("\"pending\""));
    }

    #[test]
    fn test_empty_history_has_no_version() {
        assert_eq!(SchemaSnapshot::from_statuses(&[]).version, None);
    }
}
