//! Migrator - the entry point used by the CLI
//!
//! Owns one script directory, ledger and execution engine and exposes the
//! operator-facing operations over them.

use std::sync::Arc;

use super::definitions::{
    ConsistencyReport, MigrationRunResult, MigrationScript, MigrationStatus, ReorderOutcome,
    RollbackResult,
};
use super::ledger::{FileLedger, PgLedger, VersionLedger};
use super::manager::ScriptDirectory;
use super::reorder::ReorderEngine;
use super::runner::{ExecutionEngine, LedgerOnlyRunner, PgRunner};
use super::status::{orphaned_versions, reconcile};
use super::version::Version;
use crate::error::{MigrateError, MigrateResult};
use migshift_core::{LedgerBackend, MigrateConfig};

pub struct Migrator {
    scripts: ScriptDirectory,
    ledger: Arc<dyn VersionLedger>,
    engine: Arc<dyn ExecutionEngine>,
}

impl Migrator {
    /// `ledger` and `engine` must refer to the same underlying storage
    pub fn new(
        scripts: ScriptDirectory,
        ledger: Arc<dyn VersionLedger>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            scripts,
            ledger,
            engine,
        }
    }

    /// Migrator that records changes in `ledger` without executing SQL
    pub fn ledger_only(scripts: ScriptDirectory, ledger: Arc<dyn VersionLedger>) -> Self {
        let engine = Arc::new(LedgerOnlyRunner::new(scripts.clone(), ledger.clone()));
        Self::new(scripts, ledger, engine)
    }

    /// Build from configuration. `fake` records ledger changes without
    /// executing SQL. A file ledger has no database, so it is always fake.
    pub async fn from_config(config: &MigrateConfig, fake: bool) -> MigrateResult<Self> {
        let scripts = ScriptDirectory::new(&config.migrations_dir);

        match &config.ledger {
            LedgerBackend::File(path) => {
                if !fake {
                    tracing::debug!("File ledger selected: migrations are recorded, not executed");
                }
                Ok(Self::ledger_only(scripts, Arc::new(FileLedger::new(path))))
            }
            LedgerBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    MigrateError::Config(migshift_core::ConfigError::missing_required(
                        "database_url",
                        "Set DATABASE_URL to use the postgres ledger",
                    ))
                })?;
                let ledger = PgLedger::connect(url, config.migrations_table.clone()).await?;

                if fake {
                    Ok(Self::ledger_only(scripts, Arc::new(ledger)))
                } else {
                    let engine = Arc::new(PgRunner::new(scripts.clone(), ledger.clone()));
                    Ok(Self::new(scripts, Arc::new(ledger), engine))
                }
            }
        }
    }

    pub fn scripts(&self) -> &ScriptDirectory {
        &self.scripts
    }

    /// Create the ledger's storage if needed
    pub async fn prepare(&self) -> MigrateResult<()> {
        self.ledger.ensure_storage().await
    }

    /// Every script with its applied/pending state, ascending by version
    pub async fn list_statuses(&self) -> MigrateResult<Vec<MigrationStatus>> {
        let scripts = self.scripts.load()?;
        let applied = self.ledger.applied_versions().await?;
        Ok(reconcile(&scripts, &applied))
    }

    /// Status of a single version
    pub async fn status_of(&self, version: Version) -> MigrateResult<MigrationStatus> {
        self.list_statuses()
            .await?
            .into_iter()
            .find(|status| status.version == version)
            .ok_or(MigrateError::ScriptNotFound { version })
    }

    /// Apply one migration
    pub async fn up(&self, version: Version) -> MigrateResult<bool> {
        let script = self.scripts.find(version)?;
        self.engine.up(&script).await
    }

    /// Revert one migration
    pub async fn down(&self, version: Version) -> MigrateResult<bool> {
        let script = self.scripts.find(version)?;
        self.engine.down(&script).await
    }

    /// Revert then re-apply one migration
    pub async fn redo(&self, version: Version) -> MigrateResult<()> {
        let script = self.scripts.find(version)?;
        self.engine.down(&script).await?;
        self.engine.up(&script).await?;
        Ok(())
    }

    /// Apply every pending migration up to and including `version`
    pub async fn migrate_to(&self, version: Version) -> MigrateResult<MigrationRunResult> {
        self.scripts.find(version)?;
        self.engine.migrate_through(version).await
    }

    /// Revert every applied migration above `version`; `version` itself
    /// stays applied
    pub async fn rollback_to(&self, version: Version) -> MigrateResult<RollbackResult> {
        self.scripts.find(version)?;
        self.engine.rollback_through(version).await
    }

    /// Move `migration` after every other migration
    pub async fn bring_to_top<F>(
        &self,
        migration: &MigrationStatus,
        should_rerun: F,
    ) -> MigrateResult<ReorderOutcome>
    where
        F: FnOnce() -> bool + Send,
    {
        self.reorder_engine()
            .bring_to_top(migration, should_rerun)
            .await
    }

    /// [`bring_to_top`](Self::bring_to_top) with a fallible rerun decision
    pub async fn bring_to_top_with<F>(
        &self,
        migration: &MigrationStatus,
        decide_rerun: F,
    ) -> MigrateResult<ReorderOutcome>
    where
        F: FnOnce() -> MigrateResult<bool> + Send,
    {
        self.reorder_engine()
            .bring_to_top_with(migration, decide_rerun)
            .await
    }

    fn reorder_engine(&self) -> ReorderEngine<'_> {
        ReorderEngine::new(&self.scripts, self.ledger.as_ref(), self.engine.as_ref())
    }

    /// Compare the ledger with the scripts on disk
    pub async fn consistency_report(&self) -> MigrateResult<ConsistencyReport> {
        let scripts = self.scripts.load()?;
        let applied = self.ledger.applied_versions().await?;
        Ok(ConsistencyReport {
            script_count: scripts.len(),
            applied_count: applied.len(),
            orphaned_versions: orphaned_versions(&scripts, &applied),
        })
    }

    /// Fail with `InconsistentState` if the ledger references missing scripts
    pub async fn check_consistency(&self) -> MigrateResult<ConsistencyReport> {
        let report = self.consistency_report().await?;
        if report.is_consistent() {
            return Ok(report);
        }

        let listed: Vec<String> = report
            .orphaned_versions
            .iter()
            .map(Version::to_string)
            .collect();
        Err(MigrateError::InconsistentState {
            message: format!(
                "the ledger records versions with no script on disk: {}",
                listed.join(", ")
            ),
            orphaned_versions: report.orphaned_versions,
        })
    }

    /// Create a new, empty migration script
    pub fn create_migration(&self, name: &str) -> MigrateResult<MigrationScript> {
        self.scripts.create(name)
    }
}
