//! Error types for the SQLite persistence engine.
//!
//! Provides a unified error type covering database access, lookups that
//! match nothing, model and filter errors, value conversion, migrations and
//! configuration files.

use ormagic_core::SchemaError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while persisting or loading records.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure, constraint violations included.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// No row matched a lookup, update or delete.
    #[error("{model} not found: {key}")]
    NotFound { model: String, key: String },

    /// Invalid model, unknown field or malformed filter.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A value cannot be stored in or read from a column.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A migration step the engine refuses to apply.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// File I/O failure while reading or writing configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl SqliteError {
    /// Returns `true` for `UNIQUE`, `NOT NULL`, `FOREIGN KEY` and `CHECK`
    /// violations reported by SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
        )
    }

    pub(crate) fn not_found(model: &str, key: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.to_string(),
            key: key.into(),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
