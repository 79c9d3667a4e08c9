use console::style;
use inquire::Confirm;
use migshift_engine::{MigrateError, MigrateResult, MigrationState, MigrationStatus, Version};
use serde_json::json;

use super::{format_status, print_orphans, Context};
use crate::error::CliError;

/// Status tuples plus ledger versions that have no script behind them
pub async fn collect_status(ctx: &Context) -> Result<(Vec<MigrationStatus>, Vec<Version>), CliError> {
    let statuses = ctx.migrator.list_statuses().await?;
    let report = ctx.migrator.consistency_report().await?;
    Ok((statuses, report.orphaned_versions))
}

/// `status --json` document
pub fn status_json(statuses: &[MigrationStatus], orphaned_versions: &[Version]) -> serde_json::Value {
    json!({
        "migrations": statuses,
        "orphaned_versions": orphaned_versions,
    })
}

pub async fn status(ctx: &Context, json: bool) -> Result<(), CliError> {
    let (statuses, orphaned_versions) = collect_status(ctx).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status_json(&statuses, &orphaned_versions))?
        );
        return Ok(());
    }

    if statuses.is_empty() {
        println!(
            "No migrations found in {}",
            ctx.migrator.scripts().root().display()
        );
    } else {
        println!("{}", style("Migration Status:").bold());
        for status in &statuses {
            println!("{}", format_status(status));
        }

        let applied = statuses.iter().filter(|s| s.is_applied()).count();
        println!();
        println!(
            "{} applied, {} pending",
            style(applied).green(),
            style(statuses.len() - applied).yellow()
        );
    }

    print_orphans(&orphaned_versions);
    if !orphaned_versions.is_empty() {
        println!("  {}", style("Run `migshift check` for details").dim());
    }
    Ok(())
}

pub async fn up(ctx: &Context, version: Version) -> Result<(), CliError> {
    if ctx.migrator.up(version).await? {
        println!("{} Applied {}", style("✓").green(), version);
        ctx.refresh_snapshot().await?;
    } else {
        println!("{} is already applied", version);
    }
    Ok(())
}

pub async fn down(ctx: &Context, version: Version) -> Result<(), CliError> {
    ctx.guard("down")?;
    if ctx.migrator.down(version).await? {
        println!("{} Reverted {}", style("✓").green(), version);
        ctx.refresh_snapshot().await?;
    } else {
        println!("{} is not applied", version);
    }
    Ok(())
}

pub async fn redo(ctx: &Context, version: Version) -> Result<(), CliError> {
    ctx.guard("redo")?;
    ctx.migrator.redo(version).await?;
    println!("{} Re-ran {}", style("✓").green(), version);
    ctx.refresh_snapshot().await?;
    Ok(())
}

/// Apply pending migrations up to `to`, or all of them
pub async fn migrate(ctx: &Context, to: Option<Version>) -> Result<(), CliError> {
    let target = match to {
        Some(version) => version,
        None => match ctx.migrator.scripts().last_version()? {
            Some(version) => version,
            None => {
                println!("No migrations found");
                return Ok(());
            }
        },
    };

    let result = ctx.migrator.migrate_to(target).await?;
    if result.applied.is_empty() {
        println!("No pending migrations");
        return Ok(());
    }

    println!(
        "{} Applied {} migration(s) in {}ms",
        style("✓").green(),
        result.applied.len(),
        result.execution_time_ms
    );
    ctx.refresh_snapshot().await?;
    Ok(())
}

/// Revert migrations above `to`, or only the most recently applied one
pub async fn rollback(ctx: &Context, to: Option<Version>) -> Result<(), CliError> {
    ctx.guard("rollback")?;

    let Some(target) = to else {
        let statuses = ctx.migrator.list_statuses().await?;
        let Some(latest) = statuses.iter().find(|s| s.is_most_recently_applied) else {
            println!("No migrations to roll back");
            return Ok(());
        };
        ctx.migrator.down(latest.version).await?;
        println!(
            "{} Rolled back {} ({})",
            style("✓").green(),
            latest.name,
            latest.version
        );
        ctx.refresh_snapshot().await?;
        return Ok(());
    };

    let result = ctx.migrator.rollback_to(target).await?;
    if result.rolled_back.is_empty() {
        println!("Nothing above {} is applied", target);
        return Ok(());
    }

    println!(
        "{} Rolled back {} migration(s) in {}ms",
        style("✓").green(),
        result.rolled_back.len(),
        result.execution_time_ms
    );
    ctx.refresh_snapshot().await?;
    Ok(())
}

/// Move `version` above every other migration. `rerun` of `None` asks the
/// operator, and only when the migration is applied.
pub async fn bring_to_top(ctx: &Context, version: Version, rerun: Option<bool>) -> Result<(), CliError> {
    let target = ctx.migrator.status_of(version).await?;
    bring_status_to_top(ctx, &target, rerun).await
}

pub async fn bring_status_to_top(
    ctx: &Context,
    target: &MigrationStatus,
    rerun: Option<bool>,
) -> Result<(), CliError> {
    let outcome = ctx
        .migrator
        .bring_to_top_with(target, || decide_rerun(ctx, &target.name, rerun))
        .await?;

    println!(
        "{} Moved {} from {} to {}",
        style("✓").green(),
        style(&target.name).cyan(),
        outcome.old_version,
        style(outcome.new_version).bold()
    );
    println!("  {}", style(outcome.new_path.display()).dim());
    match (outcome.state, outcome.rerun) {
        (MigrationState::Applied, true) => println!("  Reverted and re-applied"),
        (MigrationState::Applied, false) => println!("  Ledger entry moved, not re-run"),
        (MigrationState::Pending, _) => println!("  Still pending"),
    }

    if outcome.state.is_applied() {
        ctx.refresh_snapshot().await?;
    }
    Ok(())
}

fn decide_rerun(ctx: &Context, name: &str, preset: Option<bool>) -> MigrateResult<bool> {
    let rerun = match preset {
        Some(rerun) => rerun,
        None => Confirm::new(&format!("Re-run '{}' at its new version?", name))
            .with_default(false)
            .with_help_message("Reverts it at the old version, then applies it at the new one")
            .prompt()
            .map_err(|e| MigrateError::aborted(e.to_string()))?,
    };

    if rerun {
        ctx.guard("bring-to-top --rerun")
            .map_err(|e| MigrateError::aborted(e.to_string()))?;
    }
    Ok(rerun)
}

pub fn create(ctx: &Context, name: &str) -> Result<(), CliError> {
    let script = ctx.migrator.create_migration(name)?;
    println!("{} Created {}", style("✓").green(), script.path.display());
    Ok(())
}

pub async fn check(ctx: &Context) -> Result<(), CliError> {
    match ctx.migrator.check_consistency().await {
        Ok(report) => {
            println!(
                "{} {} script(s), {} applied, ledger consistent",
                style("✓").green(),
                report.script_count,
                report.applied_count
            );
            Ok(())
        }
        Err(err) => {
            if let MigrateError::InconsistentState {
                orphaned_versions, ..
            } = &err
            {
                print_orphans(orphaned_versions);
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migshift_core::MigrateConfig;
    use std::fs;
    use tempfile::TempDir;

    async fn context_with(scripts: &[i64], ledger: &str) -> (TempDir, Context) {
        let temp_dir = TempDir::new().unwrap();
        let migrations = temp_dir.path().join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        for version in scripts {
            fs::write(migrations.join(format!("{}_step.sql", version)), "").unwrap();
        }
        let ledger_path = temp_dir.path().join("ledger.json");
        fs::write(&ledger_path, ledger).unwrap();

        let config = MigrateConfig::testing(&migrations, &ledger_path);
        let ctx = Context::connect(config, false, false).await.unwrap();
        (temp_dir, ctx)
    }

    #[tokio::test]
    async fn test_status_surfaces_ledger_versions_without_a_script() {
        let (_dir, ctx) = context_with(&[10], r#"{"versions":[10,20]}"#).await;

        let (statuses, orphaned_versions) = collect_status(&ctx).await.unwrap();

        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].is_applied());
        assert_eq!(orphaned_versions, vec![Version::new(20)]);

        let document = status_json(&statuses, &orphaned_versions);
        assert_eq!(document["orphaned_versions"], json!([20]));
        assert_eq!(document["migrations"][0]["version"], json!(10));
        assert_eq!(document["migrations"][0]["state"], json!("applied"));
    }

    #[tokio::test]
    async fn test_consistent_ledger_has_no_orphans() {
        let (_dir, ctx) = context_with(&[10, 20], r#"{"versions":[10]}"#).await;

        let (statuses, orphaned_versions) = collect_status(&ctx).await.unwrap();

        assert_eq!(statuses.len(), 2);
        assert!(orphaned_versions.is_empty());
        assert_eq!(status_json(&statuses, &orphaned_versions)["orphaned_versions"], json!([]));
    }
}
