pub mod config;
pub mod interactive;
pub mod migrate;

use console::style;
use migshift_core::MigrateConfig;
use migshift_engine::{
    MigrationState, MigrationStatus, Migrator, SchemaDumper, SnapshotDumper, Version,
};

use crate::error::CliError;

/// Everything a command needs: the resolved config and a ready migrator
pub struct Context {
    pub config: MigrateConfig,
    pub migrator: Migrator,
    assume_yes: bool,
}

impl Context {
    pub async fn connect(config: MigrateConfig, fake: bool, assume_yes: bool) -> Result<Self, CliError> {
        let migrator = Migrator::from_config(&config, fake).await?;
        migrator.prepare().await?;
        Ok(Self {
            config,
            migrator,
            assume_yes,
        })
    }

    /// Refuse a destructive command in production unless `--yes` was given
    pub fn guard(&self, command: &str) -> Result<(), CliError> {
        check_confirmation(&self.config, command, self.assume_yes)
    }

    /// Rewrite the schema snapshot, if one is configured
    pub async fn refresh_snapshot(&self) -> Result<(), CliError> {
        if let Some(path) = &self.config.snapshot_path {
            let statuses = self.migrator.list_statuses().await?;
            SnapshotDumper::new(path).dump(&statuses)?;
        }
        Ok(())
    }
}

pub fn check_confirmation(config: &MigrateConfig, command: &str, assume_yes: bool) -> Result<(), CliError> {
    if config.environment.requires_confirmation() && !assume_yes {
        return Err(CliError::ConfirmationRequired {
            command: command.to_string(),
            environment: config.environment.to_string(),
        });
    }
    Ok(())
}

/// Warn about ledger versions with no script on disk, e.g. after a
/// half-finished reorder
pub fn print_orphans(orphaned_versions: &[Version]) {
    if orphaned_versions.is_empty() {
        return;
    }
    println!();
    println!(
        "{}",
        style("Ledger versions without a script:").red().bold()
    );
    for version in orphaned_versions {
        println!("  {}  {}", style("NO FILE").red(), version);
    }
}

/// One status line, e.g. `   up   20240101120000  Add users  (latest)`
pub fn format_status(status: &MigrationStatus) -> String {
    let state = match status.state {
        MigrationState::Applied => style(" up ").green().to_string(),
        MigrationState::Pending => style("down").yellow().to_string(),
    };
    let latest = if status.is_most_recently_applied {
        format!("  {}", style("(latest)").dim())
    } else {
        String::new()
    };
    format!("  {}  {:>14}  {}{}", state, status.version.to_string(), status.name, latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migshift_core::Environment;

    fn status(most_recent: bool) -> MigrationStatus {
        MigrationStatus {
            version: Version::new(20),
            name: "Add users".to_string(),
            state: MigrationState::Applied,
            is_most_recently_applied: most_recent,
        }
    }

    #[test]
    fn test_production_needs_yes() {
        let mut config = MigrateConfig::new();
        config.environment = Environment::Production;

        assert!(matches!(
            check_confirmation(&config, "down", false),
            Err(CliError::ConfirmationRequired { .. })
        ));
        assert!(check_confirmation(&config, "down", true).is_ok());
    }

    #[test]
    fn test_development_never_asks() {
        let config = MigrateConfig::new();
        assert!(check_confirmation(&config, "rollback", false).is_ok());
    }

    #[test]
    fn test_format_status_marks_latest() {
        console::set_colors_enabled(false);
        assert!(format_status(&status(true)).contains("(latest)"));
        assert!(!format_status(&status(false)).contains("(latest)"));
        assert!(format_status(&status(false)).contains("Add users"));
    }
}
