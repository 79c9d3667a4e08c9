use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{swap_in_set, VersionLedger};
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::version::Version;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    versions: BTreeSet<Version>,
}

/// Ledger kept in a JSON file.
///
/// Each write goes to a temporary file next to the target which is then
/// renamed over it, so readers see either the old or the new document.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> MigrateResult<LedgerDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LedgerDocument::default()),
            Err(e) => {
                return Err(MigrateError::ledger_read(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| MigrateError::ledger_read(format!("{}: {}", self.path.display(), e)))
    }

    fn write(&self, document: &LedgerDocument) -> MigrateResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| self.write_error(e))?;

        let bytes = serde_json::to_vec_pretty(document).map_err(|e| self.write_error(e))?;
        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| self.write_error(e))?;
        temp.write_all(&bytes).map_err(|e| self.write_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.write_error(e))?;
        temp.persist(&self.path).map_err(|e| self.write_error(e.error))?;
        Ok(())
    }

    fn write_error(&self, e: impl std::fmt::Display) -> MigrateError {
        MigrateError::ledger_write(format!("{}: {}", self.path.display(), e))
    }

    fn update<F>(&self, change: F) -> MigrateResult<()>
    where
        F: FnOnce(&mut BTreeSet<Version>) -> MigrateResult<()>,
    {
        let mut document = self.read()?;
        change(&mut document.versions)?;
        self.write(&document)
    }
}

#[async_trait]
impl VersionLedger for FileLedger {
    async fn ensure_storage(&self) -> MigrateResult<()> {
        if self.path.exists() {
            // Surface a corrupt file now rather than mid-operation
            self.read().map(|_| ())
        } else {
            self.write(&LedgerDocument::default())
        }
    }

    async fn applied_versions(&self) -> MigrateResult<BTreeSet<Version>> {
        Ok(self.read()?.versions)
    }

    async fn insert(&self, version: Version) -> MigrateResult<()> {
        self.update(|versions| {
            versions.insert(version);
            Ok(())
        })
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        self.update(|versions| {
            versions.remove(&version);
            Ok(())
        })
    }

    async fn swap(&self, old: Version, new: Version) -> MigrateResult<()> {
        self.update(|versions| swap_in_set(versions, old, new))
    }
}
