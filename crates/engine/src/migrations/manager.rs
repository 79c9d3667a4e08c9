//! Script Directory - File system side of the migration history
//!
//! Discovers `<version>_<name>.sql` scripts, resolves versions to files,
//! renames scripts to a new version and creates new ones.

use chrono::{Datelike, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::definitions::{MigrationScript, MigrationSections};
use super::version::Version;
use crate::error::{MigrateError, MigrateResult};

static SCRIPT_STEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)_(.+)$").unwrap());

/// Index over the migration scripts of one directory
#[derive(Debug, Clone)]
pub struct ScriptDirectory {
    root: PathBuf,
}

impl ScriptDirectory {
    /// Extension of migration scripts
    pub const EXTENSION: &'static str = "sql";
    /// Separator between the version prefix and the descriptive name
    pub const SEPARATOR: char = '_';

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All scripts in the directory, ascending by version.
    ///
    /// A missing directory holds no scripts. Two scripts sharing a version
    /// are rejected.
    pub fn load(&self) -> MigrateResult<Vec<MigrationScript>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let dir_error = |source: io::Error| MigrateError::DirectoryRead {
            path: self.root.clone(),
            source,
        };

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(dir_error)? {
            let path = entry.map_err(dir_error)?.path();
            if !path.is_file() {
                continue;
            }
            match Self::parse_path(&path)? {
                Some(script) => scripts.push(script),
                None => tracing::debug!("Skipping non-migration file {}", path.display()),
            }
        }

        scripts.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));

        if let Some(pair) = scripts.windows(2).find(|pair| pair[0].version == pair[1].version) {
            return Err(MigrateError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }

        Ok(scripts)
    }

    /// Resolve a version to its script
    pub fn find(&self, version: Version) -> MigrateResult<MigrationScript> {
        self.load()?
            .into_iter()
            .find(|script| script.version == version)
            .ok_or(MigrateError::ScriptNotFound { version })
    }

    /// Versions of every script on disk, applied or not, ascending
    pub fn known_versions(&self) -> MigrateResult<Vec<Version>> {
        Ok(self.load()?.into_iter().map(|script| script.version).collect())
    }

    /// Highest version on disk
    pub fn last_version(&self) -> MigrateResult<Option<Version>> {
        Ok(self.load()?.last().map(|script| script.version))
    }

    /// Parse a path into a script. `Ok(None)` for files that are not
    /// migrations; an error for files that look like one but whose version
    /// does not fit.
    pub fn parse_path(path: &Path) -> MigrateResult<Option<MigrationScript>> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
            return Ok(None);
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Ok(None);
        };
        let Some(captures) = SCRIPT_STEM.captures(stem) else {
            return Ok(None);
        };

        let version = captures[1]
            .parse::<Version>()
            .map_err(|e| MigrateError::InvalidFilename {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Some(MigrationScript {
            version,
            name: Self::humanize(&captures[2]),
            path: path.to_path_buf(),
        }))
    }

    /// `add_book_author` -> `Add book author`
    pub fn humanize(slug: &str) -> String {
        let spaced = slug.replace(Self::SEPARATOR, " ");
        let mut chars = spaced.trim().chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Swap the version prefix of `filename` for `new_version`.
    ///
    /// Everything after the prefix is kept verbatim. The new version is
    /// zero-padded to the width of the old prefix.
    pub fn replace_version_in_filename(filename: &str, new_version: Version) -> MigrateResult<String> {
        let digits = filename.bytes().take_while(u8::is_ascii_digit).count();
        let rest = &filename[digits..];

        if digits == 0 || !rest.starts_with(Self::SEPARATOR) {
            return Err(MigrateError::InvalidFilename {
                path: PathBuf::from(filename),
                reason: format!(
                    "expected <version>{}<name>.{}",
                    Self::SEPARATOR,
                    Self::EXTENSION
                ),
            });
        }

        Ok(format!("{}{}", new_version.padded(digits), rest))
    }

    /// Rename a script's file so that it carries `new_version`.
    ///
    /// Content is untouched. An existing file at the target is never
    /// overwritten.
    pub fn rename_to_version(
        &self,
        script: &MigrationScript,
        new_version: Version,
    ) -> MigrateResult<MigrationScript> {
        let new_filename = Self::replace_version_in_filename(&script.filename(), new_version)?;
        let new_path = script.path.with_file_name(&new_filename);

        if new_path.exists() {
            return Err(MigrateError::Rename {
                from: script.path.clone(),
                to: new_path,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "target file already exists"),
            });
        }

        fs::rename(&script.path, &new_path).map_err(|source| MigrateError::Rename {
            from: script.path.clone(),
            to: new_path.clone(),
            source,
        })?;

        tracing::info!(
            "Renamed {} -> {}",
            script.path.display(),
            new_path.display()
        );

        Ok(MigrationScript {
            version: new_version,
            name: script.name.clone(),
            path: new_path,
        })
    }

    /// Create a new migration script that sorts after every existing one
    pub fn create(&self, name: &str) -> MigrateResult<MigrationScript> {
        let slug = Self::slugify(name);
        if slug.is_empty() {
            return Err(MigrateError::InvalidFilename {
                path: PathBuf::from(name),
                reason: "migration name must contain letters or digits".to_string(),
            });
        }

        let existing = self.load()?;
        if let Some(clash) = existing
            .iter()
            .find(|script| script.name == Self::humanize(&slug))
        {
            return Err(MigrateError::InvalidFilename {
                path: clash.path.clone(),
                reason: format!("a migration named '{}' already exists", clash.name),
            });
        }

        let version = self.next_version(existing.last().map(|script| script.version))?;

        fs::create_dir_all(&self.root).map_err(|source| MigrateError::FileWrite {
            path: self.root.clone(),
            source,
        })?;

        let path = self.root.join(format!(
            "{}{}{}.{}",
            version,
            Self::SEPARATOR,
            slug,
            Self::EXTENSION
        ));
        fs::write(&path, Self::template(name, version)).map_err(|source| MigrateError::FileWrite {
            path: path.clone(),
            source,
        })?;

        Ok(MigrationScript {
            version,
            name: Self::humanize(&slug),
            path,
        })
    }

    /// Current UTC timestamp as a version, bumped past `last` if the clock
    /// is behind the newest script
    fn next_version(&self, last: Option<Version>) -> MigrateResult<Version> {
        let now = Utc::now();
        let stamp = Version::new(
            i64::from(now.year()) * 10_000_000_000
                + i64::from(now.month()) * 100_000_000
                + i64::from(now.day()) * 1_000_000
                + i64::from(now.hour()) * 10_000
                + i64::from(now.minute()) * 100
                + i64::from(now.second()),
        );

        match last {
            Some(last) if last >= stamp => last
                .next()
                .ok_or(MigrateError::VersionOverflow { version: last }),
            _ => Ok(stamp),
        }
    }

    fn slugify(name: &str) -> String {
        let lowered: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { Self::SEPARATOR } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || *c == Self::SEPARATOR)
            .collect();
        lowered
            .split(Self::SEPARATOR)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    fn template(name: &str, version: Version) -> String {
        format!(
            "-- Migration: {}\n\
             -- Version: {}\n\
             -- Created: {}\n\n\
             -- Up migration\n\n\n\
             -- Down migration\n\n",
            name,
            version,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Read a script and split it into its up and down sections
    pub fn read_sections(&self, script: &MigrationScript) -> MigrateResult<MigrationSections> {
        let content = fs::read_to_string(&script.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                MigrateError::ScriptNotFound {
                    version: script.version,
                }
            } else {
                MigrateError::execution(
                    script.version,
                    format!("failed to read {}: {}", script.path.display(), e),
                )
            }
        })?;
        Ok(Self::parse_sections(&content))
    }

    /// Split script content on the `-- Up migration` / `-- Down migration`
    /// markers. Comment and blank lines are dropped.
    pub fn parse_sections(content: &str) -> MigrationSections {
        let mut up_sql = Vec::new();
        let mut down_sql = Vec::new();
        let mut current_section = "";

        for line in content.lines() {
            let trimmed = line.trim().to_lowercase();

            if trimmed.starts_with("-- up") || trimmed.contains("up migration") {
                current_section = "up";
                continue;
            } else if trimmed.starts_with("-- down") || trimmed.contains("down migration") {
                current_section = "down";
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            match current_section {
                "up" => up_sql.push(line),
                "down" => down_sql.push(line),
                _ => {}
            }
        }

        MigrationSections {
            up_sql: up_sql.join("\n").trim().to_string(),
            down_sql: down_sql.join("\n").trim().to_string(),
        }
    }

    /// Split SQL into statements using a real parser, falling back to
    /// naive `;` splitting for dialect features the parser rejects
    pub fn split_statements(sql: &str) -> Vec<String> {
        if sql.trim().is_empty() {
            return Vec::new();
        }

        match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
            Err(e) => {
                tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
                sql.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("{};", s))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, filename: &str, content: &str) -> PathBuf {
        let path = dir.join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_sorts_and_humanizes() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "30_add_rating.sql", "");
        write(temp_dir.path(), "10_create_books.sql", "");
        write(temp_dir.path(), "20_add_book_author.sql", "");
        write(temp_dir.path(), "README.md", "");
        write(temp_dir.path(), "notes.sql", "");

        let scripts = ScriptDirectory::new(temp_dir.path()).load().unwrap();
        let versions: Vec<i64> = scripts.iter().map(|s| s.version.get()).collect();
        assert_eq!(versions, vec![10, 20, 30]);
        assert_eq!(scripts[1].name, "Add book author");
        assert_eq!(scripts[0].filename(), "10_create_books.sql");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let directory = ScriptDirectory::new(temp_dir.path().join("nope"));
        assert!(directory.load().unwrap().is_empty());
        assert_eq!(directory.last_version().unwrap(), None);
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "10_first.sql", "");
        write(temp_dir.path(), "0010_second.sql", "");

        let err = ScriptDirectory::new(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateVersion { version, .. } if version == Version::new(10)));
    }

    #[test]
    fn test_find_and_known_versions() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "10_a.sql", "");
        write(temp_dir.path(), "20_b.sql", "");
        let directory = ScriptDirectory::new(temp_dir.path());

        assert_eq!(directory.find(Version::new(20)).unwrap().name, "B");
        assert!(directory.find(Version::new(15)).unwrap_err().is_not_found());
        assert_eq!(
            directory.known_versions().unwrap(),
            vec![Version::new(10), Version::new(20)]
        );
        assert_eq!(directory.last_version().unwrap(), Some(Version::new(20)));
    }

    #[test]
    fn test_replace_version_in_filename() {
        assert_eq!(
            ScriptDirectory::replace_version_in_filename(
                "20200804231712_create_books.sql",
                Version::new(30900804234040)
            )
            .unwrap(),
            "30900804234040_create_books.sql"
        );
        assert_eq!(
            ScriptDirectory::replace_version_in_filename("0010_a_b_c.sql", Version::new(31)).unwrap(),
            "0031_a_b_c.sql"
        );
        assert!(ScriptDirectory::replace_version_in_filename("create.sql", Version::new(1)).is_err());
        assert!(ScriptDirectory::replace_version_in_filename("10-create.sql", Version::new(1)).is_err());
    }

    #[test]
    fn test_rename_preserves_content_and_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "20_add_book_author.sql", "-- Up migration\nSELECT 1;\n");
        let directory = ScriptDirectory::new(temp_dir.path());
        let script = directory.find(Version::new(20)).unwrap();

        let renamed = directory.rename_to_version(&script, Version::new(31)).unwrap();

        assert!(!path.exists());
        assert_eq!(renamed.filename(), "31_add_book_author.sql");
        assert_eq!(renamed.name, script.name);
        assert_eq!(
            fs::read_to_string(&renamed.path).unwrap(),
            "-- Up migration\nSELECT 1;\n"
        );
    }

    #[test]
    fn test_rename_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "20_thing.sql", "a");
        write(temp_dir.path(), "31_thing.sql", "b");
        let directory = ScriptDirectory::new(temp_dir.path());
        let script = MigrationScript {
            version: Version::new(20),
            name: "Thing".to_string(),
            path: temp_dir.path().join("20_thing.sql"),
        };

        let err = directory.rename_to_version(&script, Version::new(31)).unwrap_err();
        assert!(matches!(err, MigrateError::Rename { .. }));
        assert_eq!(fs::read_to_string(temp_dir.path().join("31_thing.sql")).unwrap(), "b");
        assert!(temp_dir.path().join("20_thing.sql").exists());
    }

    #[test]
    fn test_create_sorts_last() {
        let temp_dir = TempDir::new().unwrap();
        // Far-future version, so the clock is behind it
        write(temp_dir.path(), "99990101000000_future.sql", "");
        let directory = ScriptDirectory::new(temp_dir.path());

        let created = directory.create("Add book weight").unwrap();
        assert_eq!(created.version, Version::new(99990101000001));
        assert_eq!(created.name, "Add book weight");
        assert_eq!(created.filename(), "99990101000001_add_book_weight.sql");

        let content = fs::read_to_string(&created.path).unwrap();
        assert!(content.contains("-- Up migration"));
        assert!(content.contains("-- Down migration"));
    }

    #[test]
    fn test_create_rejects_duplicates_and_empty_names() {
        let temp_dir = TempDir::new().unwrap();
        let directory = ScriptDirectory::new(temp_dir.path());
        directory.create("create books").unwrap();

        assert!(directory.create("Create Books").is_err());
        assert!(directory.create("  !!  ").is_err());
    }

    #[test]
    fn test_parse_sections() {
        let content = "-- Migration: books\n\
                       -- Up migration\n\
                       CREATE TABLE books (id INT);\n\
                       \n\
                       -- Down migration\n\
                       DROP TABLE books;\n";
        let sections = ScriptDirectory::parse_sections(content);
        assert_eq!(sections.up_sql, "CREATE TABLE books (id INT);");
        assert_eq!(sections.down_sql, "DROP TABLE books;");
    }

    #[test]
    fn test_split_statements() {
        let statements =
            ScriptDirectory::split_statements("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(ScriptDirectory::split_statements("  ").is_empty());
    }
}
