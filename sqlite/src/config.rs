//! Store configuration.
//!
//! [`StoreConfig`] is read from YAML. Every key is optional:
//!
//! ```yaml
//! path: app.db
//! foreign_keys: true
//! journal_mode: wal
//! strict_filters: true
//! relation_depth: 1
//! max_reference_depth: 8
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// SQLite journal modes accepted by `PRAGMA journal_mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    #[default]
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }
}

/// Connection and engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    /// Enforce foreign keys (`PRAGMA foreign_keys`). Delete policies depend on it.
    pub foreign_keys: bool,
    pub journal_mode: JournalMode,
    /// Reject filters on names the model does not declare.
    pub strict_filters: bool,
    /// Many-to-many edges followed before loaded records stop getting their lists.
    pub relation_depth: usize,
    /// Nested foreign keys deeper than this stay raw key values.
    pub max_reference_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            journal_mode: JournalMode::default(),
            strict_filters: true,
            relation_depth: 1,
            max_reference_depth: 8,
        }
    }
}

impl StoreConfig {
    /// Configuration for a database file, defaults otherwise.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Loads the configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::SqliteError::IoError) if the file cannot be
    /// read, or [`YamlError`](crate::SqliteError::YamlError) if it is not
    /// valid YAML for this structure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::SqliteError::IoError) if the file cannot be
    /// created, or [`YamlError`](crate::SqliteError::YamlError) on
    /// serialization failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// The engine settings handed to each [`Store`](crate::Store).
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            strict_filters: self.strict_filters,
            relation_depth: self.relation_depth,
            max_reference_depth: self.max_reference_depth,
        }
    }
}

/// Per-store behavior derived from [`StoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub strict_filters: bool,
    pub relation_depth: usize,
    pub max_reference_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreConfig::default().options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.foreign_keys);
        assert!(config.strict_filters);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.relation_depth, 1);
        assert_eq!(config.max_reference_depth, 8);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: StoreConfig =
            serde_yaml::from_str("path: app.db\njournal_mode: delete\nrelation_depth: 2\n").unwrap();
        assert_eq!(config.path, Some(PathBuf::from("app.db")));
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.relation_depth, 2);
        assert!(config.foreign_keys);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");

        let mut config = StoreConfig::with_path("data.db");
        config.strict_filters = false;
        config.save(&path).unwrap();

        assert_eq!(StoreConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoreConfig::load("/nonexistent/store.yaml").unwrap_err();
        assert!(matches!(err, crate::SqliteError::IoError(_)));
    }
}
