//! Version Ledger - the durable set of applied migration versions

mod file;
mod postgres;

pub use file::FileLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::sync::RwLock;

use super::version::Version;
use crate::error::{MigrateError, MigrateResult};

/// Read/write access to the applied versions
#[async_trait]
pub trait VersionLedger: Send + Sync {
    /// Create the backing storage if it does not exist yet
    async fn ensure_storage(&self) -> MigrateResult<()> {
        Ok(())
    }

    /// Every applied version
    async fn applied_versions(&self) -> MigrateResult<BTreeSet<Version>>;

    /// Record `version` as applied
    async fn insert(&self, version: Version) -> MigrateResult<()>;

    /// Forget `version`
    async fn remove(&self, version: Version) -> MigrateResult<()>;

    /// Replace `old` with `new` in one atomic step. Fails without changing
    /// anything if `old` is absent or `new` is already present.
    async fn swap(&self, old: Version, new: Version) -> MigrateResult<()>;

    async fn contains(&self, version: Version) -> MigrateResult<bool> {
        Ok(self.applied_versions().await?.contains(&version))
    }
}

/// Checks shared by the ledgers that apply `swap` to an in-memory set
pub(crate) fn swap_in_set(
    versions: &mut BTreeSet<Version>,
    old: Version,
    new: Version,
) -> MigrateResult<()> {
    if versions.contains(&new) {
        return Err(MigrateError::ledger_write(format!(
            "cannot move {} to {}: {} is already recorded",
            old, new, new
        )));
    }
    if !versions.remove(&old) {
        return Err(MigrateError::ledger_write(format!(
            "cannot move {} to {}: {} is not recorded",
            old, new, old
        )));
    }
    versions.insert(new);
    Ok(())
}

/// In-process ledger, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryLedger {
    versions: RwLock<BTreeSet<Version>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            versions: RwLock::new(versions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl VersionLedger for MemoryLedger {
    async fn applied_versions(&self) -> MigrateResult<BTreeSet<Version>> {
        Ok(self.versions.read().await.clone())
    }

    async fn insert(&self, version: Version) -> MigrateResult<()> {
        self.versions.write().await.insert(version);
        Ok(())
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        self.versions.write().await.remove(&version);
        Ok(())
    }

    async fn swap(&self, old: Version, new: Version) -> MigrateResult<()> {
        swap_in_set(&mut *self.versions.write().await, old, new)
    }
}
