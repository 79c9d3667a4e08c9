//! Reorder Engine - moves a migration after every other one
//!
//! The script file is renamed first and the ledger edited second. The two
//! share no transaction, so a ledger failure after the rename is reported
//! as [`MigrateError::ReorderIncomplete`] with everything needed to repair
//! it by hand. The rename is never undone automatically.

use super::definitions::{MigrationScript, MigrationState, MigrationStatus, ReorderOutcome};
use super::ledger::VersionLedger;
use super::manager::ScriptDirectory;
use super::runner::ExecutionEngine;
use super::version::Version;
use crate::error::{MigrateError, MigrateResult};

/// Bring-to-top over one script directory, ledger and execution engine
pub struct ReorderEngine<'a> {
    scripts: &'a ScriptDirectory,
    ledger: &'a dyn VersionLedger,
    engine: &'a dyn ExecutionEngine,
}

impl<'a> ReorderEngine<'a> {
    pub fn new(
        scripts: &'a ScriptDirectory,
        ledger: &'a dyn VersionLedger,
        engine: &'a dyn ExecutionEngine,
    ) -> Self {
        Self {
            scripts,
            ledger,
            engine,
        }
    }

    /// Give `migration` the version after the current maximum.
    ///
    /// `should_rerun` is asked at most once, and only when the migration is
    /// applied. An applied migration keeps its ledger entry under the new
    /// version; when a rerun is requested it is reverted at its old version
    /// and applied again at the new one.
    pub async fn bring_to_top<F>(
        &self,
        migration: &MigrationStatus,
        should_rerun: F,
    ) -> MigrateResult<ReorderOutcome>
    where
        F: FnOnce() -> bool + Send,
    {
        self.bring_to_top_with(migration, || Ok(should_rerun())).await
    }

    /// Like [`bring_to_top`](Self::bring_to_top), but the decision may fail,
    /// e.g. when the operator cancels a prompt. A failed decision aborts the
    /// operation before anything is changed.
    pub async fn bring_to_top_with<F>(
        &self,
        migration: &MigrationStatus,
        decide_rerun: F,
    ) -> MigrateResult<ReorderOutcome>
    where
        F: FnOnce() -> MigrateResult<bool> + Send,
    {
        let old_version = migration.version;

        let scripts = self.scripts.load()?;
        let script = scripts
            .iter()
            .find(|script| script.version == old_version)
            .ok_or(MigrateError::ScriptNotFound {
                version: old_version,
            })?;

        // load() sorts ascending, and `script` is in the list
        let max_known = scripts.last().map_or(old_version, |last| last.version);
        let new_version = max_known
            .next()
            .ok_or(MigrateError::VersionOverflow { version: max_known })?;

        let applied = self.ledger.applied_versions().await?;
        if applied.contains(&new_version) {
            return Err(MigrateError::InconsistentState {
                message: format!(
                    "the ledger already records {} but no script carries that version",
                    new_version
                ),
                orphaned_versions: vec![new_version],
            });
        }

        let state = if applied.contains(&old_version) {
            MigrationState::Applied
        } else {
            MigrationState::Pending
        };
        if state != migration.state {
            tracing::warn!(
                "Status of {} ({}) changed since it was listed: now {}",
                migration.name,
                old_version,
                state
            );
        }

        // Decided before any mutation so nothing waits on the operator
        // between the rename and the ledger edit
        let rerun = match state {
            MigrationState::Applied => decide_rerun()?,
            MigrationState::Pending => false,
        };

        let renamed = self.scripts.rename_to_version(script, new_version)?;

        let outcome = ReorderOutcome {
            old_version,
            new_version,
            old_path: script.path.clone(),
            new_path: renamed.path.clone(),
            state,
            rerun,
        };

        if state == MigrationState::Pending {
            return Ok(outcome);
        }

        let ledger_result = if rerun {
            self.rerun_at_new_version(&renamed, old_version).await
        } else {
            self.ledger.swap(old_version, new_version).await
        };

        ledger_result.map_err(|source| MigrateError::ReorderIncomplete {
            old_version,
            new_version,
            path: renamed.path.clone(),
            source: Box::new(source),
        })?;

        tracing::info!(
            "Moved {} from {} to {}{}",
            renamed.name,
            old_version,
            new_version,
            if rerun { " and re-ran it" } else { "" }
        );

        Ok(outcome)
    }

    /// Revert under the old ledger entry, then apply under the new one.
    /// The file already carries the new version at this point.
    async fn rerun_at_new_version(
        &self,
        renamed: &MigrationScript,
        old_version: Version,
    ) -> MigrateResult<()> {
        self.engine
            .down(&renamed.with_ledger_version(old_version))
            .await?;
        self.engine.up(renamed).await?;
        Ok(())
    }
}
