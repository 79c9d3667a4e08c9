use crate::config::{
    ConfigError, ConfigFile, ConfigSource, ConfigValidator, IdentifierValidator,
    LogLevelValidator, UrlValidator,
};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration trait for the migration tool
pub trait MigrateConfigTrait: Sized {
    /// Load configuration from defaults and environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> &HashMap<String, ConfigSource>;
}

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::invalid_value(
                "environment",
                s,
                "development, testing, or production",
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    /// Check if environment is production
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Destructive commands need an explicit `--yes` outside development and testing
    pub fn requires_confirmation(&self) -> bool {
        self.is_production()
    }
}

/// Where the applied-versions ledger lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// A table in the database at `database_url`
    Postgres,
    /// A JSON file, for projects without a reachable database
    File(PathBuf),
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(LedgerBackend::File(PathBuf::from(path))),
            _ if s.eq_ignore_ascii_case("postgres") => Ok(LedgerBackend::Postgres),
            _ => Err(ConfigError::invalid_value(
                "ledger",
                s,
                "'postgres' or 'file:<path>'",
            )),
        }
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerBackend::Postgres => write!(f, "postgres"),
            LedgerBackend::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Resolved configuration for one invocation of the tool
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub environment: Environment,
    pub migrations_dir: PathBuf,
    pub ledger: LedgerBackend,
    pub database_url: Option<String>,
    pub migrations_table: String,
    pub snapshot_path: Option<PathBuf>,
    pub log_level: String,
    sources: HashMap<String, ConfigSource>,
}

impl MigrateConfig {
    pub const DEFAULT_MIGRATIONS_DIR: &'static str = "db/migrate";
    pub const DEFAULT_TABLE: &'static str = "schema_migrations";

    /// Create a new default configuration
    pub fn new() -> Self {
        let mut config = Self {
            environment: Environment::Development,
            migrations_dir: PathBuf::from(Self::DEFAULT_MIGRATIONS_DIR),
            ledger: LedgerBackend::Postgres,
            database_url: None,
            migrations_table: Self::DEFAULT_TABLE.to_string(),
            snapshot_path: None,
            log_level: "info".to_string(),
            sources: HashMap::new(),
        };
        for (field, value) in [
            ("environment", "development"),
            ("migrations_dir", Self::DEFAULT_MIGRATIONS_DIR),
            ("ledger", "postgres"),
            ("migrations_table", Self::DEFAULT_TABLE),
            ("log_level", "info"),
        ] {
            config.record(field, ConfigSource::Default(value.to_string()));
        }
        config
    }

    /// Configuration for tests: file ledger, no database
    pub fn testing(migrations_dir: impl Into<PathBuf>, ledger_file: impl Into<PathBuf>) -> Self {
        let mut config = Self::new();
        config.environment = Environment::Testing;
        config.migrations_dir = migrations_dir.into();
        config.ledger = LedgerBackend::File(ledger_file.into());
        config.log_level = "warn".to_string();
        config
    }

    /// Defaults, then the YAML file (explicit path or discovered in the
    /// working directory), then the environment. Not validated: command line
    /// overrides still apply, so callers run `validate()` last.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        let file = match config_file {
            Some(path) => Some((path.to_path_buf(), ConfigFile::load(path)?)),
            None => {
                let cwd = env::current_dir().map_err(|source| ConfigError::FileSystemError {
                    path: ".".to_string(),
                    source,
                })?;
                ConfigFile::discover(&cwd)?
            }
        };
        if let Some((path, file)) = file {
            tracing::debug!("Loaded configuration file {}", path.display());
            config.apply_file(&file, &path.display().to_string())?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay the values present in a configuration file
    pub fn apply_file(&mut self, file: &ConfigFile, origin: &str) -> Result<(), ConfigError> {
        let source = || ConfigSource::File(origin.to_string());

        if let Some(env_str) = &file.environment {
            self.environment = env_str.parse()?;
            self.record("environment", source());
        }
        if let Some(dir) = &file.migrations_dir {
            self.migrations_dir = dir.clone();
            self.record("migrations_dir", source());
        }
        if let Some(ledger) = &file.ledger {
            self.ledger = ledger.parse()?;
            self.record("ledger", source());
        }
        if let Some(url) = &file.database_url {
            self.database_url = Some(url.clone());
            self.record("database_url", source());
        }
        if let Some(table) = &file.migrations_table {
            self.migrations_table = table.clone();
            self.record("migrations_table", source());
        }
        if let Some(path) = &file.snapshot_path {
            self.snapshot_path = Some(path.clone());
            self.record("snapshot_path", source());
        }
        if let Some(level) = &file.log_level {
            self.log_level = level.clone();
            self.record("log_level", source());
        }
        Ok(())
    }

    /// Overlay environment variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env_str) = lookup("ENVIRONMENT") {
            self.environment = env_str.parse()?;
            self.record("environment", ConfigSource::EnvVar("ENVIRONMENT".to_string()));
        }
        if let Some(dir) = lookup("MIGSHIFT_MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
            self.record(
                "migrations_dir",
                ConfigSource::EnvVar("MIGSHIFT_MIGRATIONS_DIR".to_string()),
            );
        }
        if let Some(ledger) = lookup("MIGSHIFT_LEDGER") {
            self.ledger = ledger.parse()?;
            self.record("ledger", ConfigSource::EnvVar("MIGSHIFT_LEDGER".to_string()));
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
            self.record("database_url", ConfigSource::EnvVar("DATABASE_URL".to_string()));
        }
        if let Some(table) = lookup("MIGSHIFT_TABLE") {
            self.migrations_table = table;
            self.record("migrations_table", ConfigSource::EnvVar("MIGSHIFT_TABLE".to_string()));
        }
        if let Some(path) = lookup("MIGSHIFT_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(path));
            self.record("snapshot_path", ConfigSource::EnvVar("MIGSHIFT_SNAPSHOT".to_string()));
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
            self.record("log_level", ConfigSource::EnvVar("LOG_LEVEL".to_string()));
        }
        Ok(())
    }

    /// Command line override for the migrations directory
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self.record("migrations_dir", ConfigSource::CommandLine("--dir".to_string()));
        self
    }

    /// Command line override that switches to a file ledger
    pub fn with_ledger_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger = LedgerBackend::File(path.into());
        self.record("ledger", ConfigSource::CommandLine("--ledger-file".to_string()));
        self
    }

    /// Command line override for the log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self.record("log_level", ConfigSource::CommandLine("--verbose".to_string()));
        self
    }

    /// Database URL with the password masked, for display
    pub fn masked_database_url(&self) -> Option<String> {
        self.database_url.as_ref().map(|raw| {
            url::Url::parse(raw)
                .map(|mut parsed| {
                    if parsed.password().is_some() {
                        let _ = parsed.set_password(Some("***"));
                    }
                    parsed.to_string()
                })
                .unwrap_or_else(|_| "postgresql://***".to_string())
        })
    }

    fn record(&mut self, field: &str, source: ConfigSource) {
        self.sources.insert(field.to_string(), source);
    }
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrateConfigTrait for MigrateConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        LogLevelValidator.validate(self.log_level.as_str())?;
        IdentifierValidator::new("migrations_table").validate(self.migrations_table.as_str())?;

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value(
                "migrations_dir",
                "",
                "a directory path",
            ));
        }

        if self.ledger == LedgerBackend::Postgres {
            let url = self.database_url.as_deref().ok_or_else(|| {
                ConfigError::missing_required(
                    "database_url",
                    "Set DATABASE_URL or use a file ledger (--ledger-file / MIGSHIFT_LEDGER=file:<path>)",
                )
            })?;
            UrlValidator::default().validate(url)?;
        }

        Ok(())
    }

    fn config_sources(&self) -> &HashMap<String, ConfigSource> {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_require_database_url() {
        let config = MigrateConfig::new();
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrate"));
        assert_eq!(config.migrations_table, "schema_migrations");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_testing_config_is_valid_without_database() {
        let config = MigrateConfig::testing("db/migrate", "ledger.json");
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger, LedgerBackend::File(PathBuf::from("ledger.json")));
    }

    #[test]
    fn test_ledger_backend_parsing() {
        assert_eq!("postgres".parse::<LedgerBackend>().unwrap(), LedgerBackend::Postgres);
        assert_eq!(
            "file:/tmp/ledger.json".parse::<LedgerBackend>().unwrap(),
            LedgerBackend::File(PathBuf::from("/tmp/ledger.json"))
        );
        assert!("file:".parse::<LedgerBackend>().is_err());
        assert!("sqlite".parse::<LedgerBackend>().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = MigrateConfig::new();
        let file = ConfigFile {
            migrations_dir: Some(PathBuf::from("from_file")),
            log_level: Some("debug".to_string()),
            ..ConfigFile::default()
        };
        config.apply_file(&file, "migshift.yaml").unwrap();
        config
            .apply_env(lookup_from(&[
                ("MIGSHIFT_MIGRATIONS_DIR", "from_env"),
                ("DATABASE_URL", "postgres://localhost/app"),
            ]))
            .unwrap();

        assert_eq!(config.migrations_dir, PathBuf::from("from_env"));
        assert_eq!(config.log_level, "debug");
        assert!(config.config_sources()["migrations_dir"].is_env_var());
        assert!(config.config_sources()["log_level"].is_file());
        assert!(config.config_sources()["migrations_table"].is_default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_line_overrides_win() {
        let config = MigrateConfig::new()
            .with_migrations_dir("cli_dir")
            .with_ledger_file("cli_ledger.json");
        assert_eq!(config.migrations_dir, PathBuf::from("cli_dir"));
        assert_eq!(
            config.config_sources()["ledger"],
            ConfigSource::CommandLine("--ledger-file".to_string())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let mut config = MigrateConfig::testing("db/migrate", "ledger.json");
        config.migrations_table = "schema migrations".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked_database_url() {
        let mut config = MigrateConfig::new();
        config.database_url = Some("postgres://app:secret@db:5432/prod".to_string());
        let masked = config.masked_database_url().unwrap();
        assert!(!masked.contains("secret"));
        assert!(masked.contains("***"));
    }

    #[test]
    fn test_production_requires_confirmation() {
        assert!(Environment::Production.requires_confirmation());
        assert!(!Environment::Development.requires_confirmation());
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        env::set_var("MIGSHIFT_LEDGER", "file:env_ledger.json");
        env::set_var("MIGSHIFT_TABLE", "applied_versions");
        let config = MigrateConfig::from_env();
        env::remove_var("MIGSHIFT_LEDGER");
        env::remove_var("MIGSHIFT_TABLE");

        let config = config.unwrap();
        assert_eq!(config.ledger, LedgerBackend::File(PathBuf::from("env_ledger.json")));
        assert_eq!(config.migrations_table, "applied_versions");
    }
}
