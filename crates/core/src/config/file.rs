use crate::config::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "migshift.yaml";

/// On-disk configuration layer. Every field is optional; absent fields keep
/// the value from the layer below.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub environment: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    /// `postgres` or `file:<path>`
    pub ledger: Option<String>,
    pub database_url: Option<String>,
    pub migrations_table: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Parse a configuration file from YAML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read and parse the file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileSystemError {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `migshift.yaml` from `dir` if it exists
    pub fn discover(dir: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if !candidate.is_file() {
            return Ok(None);
        }
        let file = Self::load(&candidate)?;
        Ok(Some((candidate, file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_file() {
        let file = ConfigFile::parse("migrations_dir: db/changes\nlog_level: debug\n").unwrap();
        assert_eq!(file.migrations_dir, Some(PathBuf::from("db/changes")));
        assert_eq!(file.log_level.as_deref(), Some("debug"));
        assert!(file.ledger.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(ConfigFile::parse("   \n").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ConfigFile::parse("migration_dir: typo\n").is_err());
    }

    #[test]
    fn test_discover() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ConfigFile::discover(temp_dir.path()).unwrap().is_none());

        fs::write(
            temp_dir.path().join(DEFAULT_CONFIG_FILE),
            "ledger: file:ledger.json\n",
        )
        .unwrap();
        let (path, file) = ConfigFile::discover(temp_dir.path()).unwrap().unwrap();
        assert!(path.ends_with(DEFAULT_CONFIG_FILE));
        assert_eq!(file.ledger.as_deref(), Some("file:ledger.json"));
    }
}
