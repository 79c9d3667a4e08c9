use migshift_core::ConfigError;
use migshift_engine::MigrateError;
use thiserror::Error;

/// Top-level error for the `migshift` binary
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migrate(#[from] MigrateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialise logging: {message}")]
    Logging { message: String },

    #[error("'{command}' is destructive in the {environment} environment")]
    ConfirmationRequired {
        command: String,
        environment: String,
    },
}

impl CliError {
    /// Follow-up advice printed below the error
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::Migrate(MigrateError::ReorderIncomplete {
                old_version,
                new_version,
                ..
            }) => Some(format!(
                "The script already carries version {new}. Replace {old} with {new} in the \
                 ledger, then run `migshift check`.",
                old = old_version,
                new = new_version
            )),
            CliError::Migrate(MigrateError::InconsistentState { .. }) => Some(
                "Restore the missing scripts or remove their versions from the ledger.".to_string(),
            ),
            CliError::ConfirmationRequired { .. } => {
                Some("Re-run with --yes to confirm.".to_string())
            }
            CliError::Config(ConfigError::MissingRequired { hint, .. }) => Some(hint.clone()),
            _ => None,
        }
    }

    /// Process exit code; a half-finished reorder gets its own
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Migrate(MigrateError::ReorderIncomplete { .. }) => 3,
            CliError::Migrate(MigrateError::InconsistentState { .. }) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migshift_engine::Version;
    use std::path::PathBuf;

    #[test]
    fn test_reorder_incomplete_hint_names_both_versions() {
        let err = CliError::from(MigrateError::ReorderIncomplete {
            old_version: Version::new(20),
            new_version: Version::new(31),
            path: PathBuf::from("db/migrate/31_add_users.sql"),
            source: Box::new(MigrateError::ledger_write("timeout")),
        });

        let hint = err.hint().unwrap();
        assert!(hint.contains("20"));
        assert!(hint.contains("31"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_plain_errors_exit_with_one() {
        let err = CliError::from(MigrateError::ScriptNotFound {
            version: Version::new(5),
        });
        assert_eq!(err.exit_code(), 1);
        assert!(err.hint().is_none());
    }
}
