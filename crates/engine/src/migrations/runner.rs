//! Migration Runner - Executes migrations and keeps the ledger in step
//!
//! `PgRunner` runs a script's SQL and its ledger change in one Postgres
//! transaction. `LedgerOnlyRunner` only records the ledger change, for
//! bookkeeping without a database to execute against.

use async_trait::async_trait;
use std::sync::Arc;

use super::definitions::{MigrationRunResult, MigrationScript, RollbackResult};
use super::ledger::{PgLedger, VersionLedger};
use super::manager::ScriptDirectory;
use super::version::Version;
use crate::error::{MigrateError, MigrateResult};

/// Runs single migrations forward or backward
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Directory the engine resolves versions against
    fn scripts(&self) -> &ScriptDirectory;

    /// Ledger the engine records into
    fn ledger(&self) -> &dyn VersionLedger;

    /// Apply `script` and record `script.version`. Returns false without
    /// doing anything if that version is already recorded.
    async fn up(&self, script: &MigrationScript) -> MigrateResult<bool>;

    /// Revert `script` and forget `script.version`. Returns false without
    /// doing anything if that version is not recorded.
    ///
    /// `script.version` is the ledger entry to remove; the SQL is read from
    /// `script.path`, which may already carry a different version prefix.
    async fn down(&self, script: &MigrationScript) -> MigrateResult<bool>;

    /// Apply every pending migration up to and including `target`, ascending
    async fn migrate_through(&self, target: Version) -> MigrateResult<MigrationRunResult> {
        let start_time = std::time::Instant::now();
        let applied = self.ledger().applied_versions().await?;

        let mut result = MigrationRunResult::default();
        for script in self.scripts().load()? {
            if script.version > target || applied.contains(&script.version) {
                continue;
            }
            if self.up(&script).await? {
                result.applied.push(script.version);
            }
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// Revert every applied migration above `target`, descending.
    ///
    /// `target` itself stays applied: the lower boundary is exclusive. To
    /// revert one specific migration use `down`.
    async fn rollback_through(&self, target: Version) -> MigrateResult<RollbackResult> {
        let start_time = std::time::Instant::now();
        let applied = self.ledger().applied_versions().await?;
        let scripts = self.scripts().load()?;

        let mut result = RollbackResult::default();
        for version in applied.into_iter().rev().filter(|version| *version > target) {
            let script = scripts
                .iter()
                .find(|script| script.version == version)
                .ok_or(MigrateError::ScriptNotFound { version })?;
            if self.down(script).await? {
                result.rolled_back.push(version);
            }
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }
}

fn ensure_script_exists(script: &MigrationScript) -> MigrateResult<()> {
    if script.path.is_file() {
        Ok(())
    } else {
        Err(MigrateError::ScriptNotFound {
            version: script.version,
        })
    }
}

/// Executes migrations against Postgres
pub struct PgRunner {
    scripts: ScriptDirectory,
    ledger: PgLedger,
}

impl PgRunner {
    pub fn new(scripts: ScriptDirectory, ledger: PgLedger) -> Self {
        Self { scripts, ledger }
    }

    /// Run `sql` and the ledger change for `script` in one transaction
    async fn execute(
        &self,
        script: &MigrationScript,
        sql: &str,
        record: bool,
    ) -> MigrateResult<()> {
        let version = script.version;
        let mut transaction = self.ledger.pool().begin().await.map_err(|e| {
            MigrateError::execution(version, format!("Failed to start transaction: {}", e))
        })?;

        for statement in ScriptDirectory::split_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *transaction)
                .await
                .map_err(|e| MigrateError::execution(version, e))?;
        }

        if record {
            self.ledger.insert_in(&mut transaction, version).await?;
        } else {
            self.ledger.delete_in(&mut transaction, version).await?;
        }

        transaction.commit().await.map_err(|e| {
            MigrateError::execution(version, format!("Failed to commit migration: {}", e))
        })
    }
}

#[async_trait]
impl ExecutionEngine for PgRunner {
    fn scripts(&self) -> &ScriptDirectory {
        &self.scripts
    }

    fn ledger(&self) -> &dyn VersionLedger {
        &self.ledger
    }

    async fn up(&self, script: &MigrationScript) -> MigrateResult<bool> {
        if self.ledger.contains(script.version).await? {
            tracing::info!("{} ({}) is already applied", script.name, script.version);
            return Ok(false);
        }

        let sections = self.scripts.read_sections(script)?;
        tracing::info!("Migrating to {} ({})", script.name, script.version);
        self.execute(script, &sections.up_sql, true).await?;
        Ok(true)
    }

    async fn down(&self, script: &MigrationScript) -> MigrateResult<bool> {
        if !self.ledger.contains(script.version).await? {
            tracing::info!("{} ({}) is not applied", script.name, script.version);
            return Ok(false);
        }

        let sections = self.scripts.read_sections(script)?;
        tracing::info!("Reverting {} ({})", script.name, script.version);
        self.execute(script, &sections.down_sql, false).await?;
        Ok(true)
    }
}

/// Records migrations in the ledger without executing their SQL
pub struct LedgerOnlyRunner {
    scripts: ScriptDirectory,
    ledger: Arc<dyn VersionLedger>,
}

impl LedgerOnlyRunner {
    pub fn new(scripts: ScriptDirectory, ledger: Arc<dyn VersionLedger>) -> Self {
        Self { scripts, ledger }
    }
}

#[async_trait]
impl ExecutionEngine for LedgerOnlyRunner {
    fn scripts(&self) -> &ScriptDirectory {
        &self.scripts
    }

    fn ledger(&self) -> &dyn VersionLedger {
        self.ledger.as_ref()
    }

    async fn up(&self, script: &MigrationScript) -> MigrateResult<bool> {
        ensure_script_exists(script)?;
        if self.ledger.contains(script.version).await? {
            tracing::info!("{} ({}) is already applied", script.name, script.version);
            return Ok(false);
        }

        tracing::info!("Recording {} ({}) as applied", script.name, script.version);
        self.ledger.insert(script.version).await?;
        Ok(true)
    }

    async fn down(&self, script: &MigrationScript) -> MigrateResult<bool> {
        ensure_script_exists(script)?;
        if !self.ledger.contains(script.version).await? {
            tracing::info!("{} ({}) is not applied", script.name, script.version);
            return Ok(false);
        }

        tracing::info!("Recording {} ({}) as reverted", script.name, script.version);
        self.ledger.remove(script.version).await?;
        Ok(true)
    }
}
