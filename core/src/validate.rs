//! Model validation.
//!
//! Catches declarations that cannot be mapped onto tables before any SQL is
//! generated: names that are not plain identifiers, duplicate fields, a
//! missing or ambiguous primary key, and relations that the junction-table
//! scheme cannot represent.
//!
//! # Examples
//!
//! ```
//! use ormagic_core::*;
//!
//! let fields = vec![Field::integer("id").primary_key(), Field::text("name")];
//! assert!(validate_model("User", &fields).is_empty());
//!
//! // Two primary keys
//! let bad = vec![Field::integer("a").primary_key(), Field::integer("b").primary_key()];
//! assert!(!validate_model("User", &bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{FieldType, OnDelete, Registry};
use crate::Field;

/// Model validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Model name is empty.
    #[error("model name cannot be empty")]
    EmptyModelName,
    /// A model or field name is not a plain SQL identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// A model or field name is a reserved SQL keyword.
    #[error("reserved SQL keyword used as a name: {0}")]
    ReservedWord(String),
    /// Two fields share a name.
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    /// No field is flagged as primary key.
    #[error("model has no primary key")]
    MissingPrimaryKey,
    /// More than one field is flagged as primary key.
    #[error("multiple primary keys: {0}")]
    MultiplePrimaryKeys(String),
    /// A relation field is flagged as primary key.
    #[error("relation field cannot be a primary key: {0}")]
    RelationPrimaryKey(String),
    /// A many-to-many relation targets its own model.
    #[error("many-to-many field '{0}' cannot target its own model")]
    SelfReferenceList(String),
    /// Two many-to-many fields target the same model and would share a junction table.
    #[error("many-to-many fields '{first}' and '{second}' target the same model")]
    DuplicateReferenceList { first: String, second: String },
    /// `SET NULL` on a column that cannot hold `NULL`.
    #[error("field '{0}' uses SET NULL but is required")]
    SetNullOnRequired(String),
    /// `SET DEFAULT` on a column without a default.
    #[error("field '{0}' uses SET DEFAULT but has no default")]
    SetDefaultWithoutDefault(String),
    /// A relation points at a model the registry does not know.
    #[error("field '{field}' references unknown model '{target}'")]
    UnknownTarget { field: String, target: String },
    /// Two models map to the same table name.
    #[error("table '{0}' is used by more than one model")]
    DuplicateTable(String),
}

/// Returns `true` if `name` can be interpolated into SQL as an identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Keywords SQLite refuses as bare table or column names.
const RESERVED_WORDS: &[&str] = &[
    "add", "all", "alter", "and", "as", "autoincrement", "between", "case", "check", "collate",
    "commit", "constraint", "create", "cross", "default", "deferrable", "delete", "distinct",
    "drop", "else", "escape", "except", "exists", "filter", "foreign", "from", "full", "glob",
    "group", "having", "in", "index", "indexed", "inner", "insert", "intersect", "into", "is",
    "isnull", "join", "left", "like", "limit", "match", "natural", "not", "nothing", "notnull",
    "null", "on", "or", "order", "outer", "over", "primary", "references", "regexp", "returning",
    "right", "select", "set", "table", "then", "to", "transaction", "union", "unique", "update",
    "using", "values", "when", "where", "window",
];

/// Returns `true` if `name` is a keyword SQLite will not parse as an identifier.
pub(crate) fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(name))
}

fn check_name(name: &str, errors: &mut Vec<ValidationError>) {
    if !is_identifier(name) {
        errors.push(ValidationError::InvalidIdentifier(name.to_string()));
    } else if is_reserved_word(name) {
        errors.push(ValidationError::ReservedWord(name.to_string()));
    }
}

/// Validates one model declaration (after the implicit primary key has been added).
pub fn validate_model(name: &str, fields: &[Field]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if name.is_empty() {
        errors.push(ValidationError::EmptyModelName);
    } else {
        check_name(name, &mut errors);
    }

    let mut seen = HashSet::new();
    for field in fields {
        check_name(&field.name, &mut errors);
        if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::DuplicateField(field.name.clone()));
        }
    }

    let keys: Vec<&str> = fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| f.name.as_str())
        .collect();
    match keys.len() {
        0 => errors.push(ValidationError::MissingPrimaryKey),
        1 => {}
        _ => errors.push(ValidationError::MultiplePrimaryKeys(keys.join(", "))),
    }

    let mut list_targets: Vec<(&str, &str)> = Vec::new();
    for field in fields {
        if field.primary_key && field.field_type.target().is_some() {
            errors.push(ValidationError::RelationPrimaryKey(field.name.clone()));
        }
        if let FieldType::ReferenceList(target) = &field.field_type {
            if target.eq_ignore_ascii_case(name) {
                errors.push(ValidationError::SelfReferenceList(field.name.clone()));
            }
            if let Some((first, _)) = list_targets.iter().find(|(_, t)| *t == target.as_str()) {
                errors.push(ValidationError::DuplicateReferenceList {
                    first: (*first).to_string(),
                    second: field.name.clone(),
                });
            }
            list_targets.push((field.name.as_str(), target.as_str()));
        }
        if field.field_type.is_reference() {
            match field.on_delete {
                OnDelete::SetNull if field.is_not_null() => {
                    errors.push(ValidationError::SetNullOnRequired(field.name.clone()));
                }
                OnDelete::SetDefault if field.default.is_none() => {
                    errors.push(ValidationError::SetDefaultWithoutDefault(field.name.clone()));
                }
                _ => {}
            }
        }
    }

    errors
}

/// Validates cross-model consistency of a registry.
///
/// Returns the offending model names with their errors.
pub fn validate_registry(registry: &Registry) -> Vec<(String, Vec<ValidationError>)> {
    let mut result = Vec::new();
    let mut tables = HashSet::new();

    for model in registry.models() {
        let mut errors = Vec::new();
        if !tables.insert(model.table()) {
            errors.push(ValidationError::DuplicateTable(model.table().to_string()));
        }
        for field in model.fields() {
            if let Some(target) = field.field_type.target() {
                if !registry.contains(target) {
                    errors.push(ValidationError::UnknownTarget {
                        field: field.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        if !errors.is_empty() {
            result.push((model.name().to_string(), errors));
        }
    }

    result
}
