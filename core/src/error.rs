//! Error types for model definition and query construction.

use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while building models or compiling filters against them.
///
/// None of these touch the database: they are programming errors in the
/// model declarations or in the filters handed to the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The model failed structural validation.
    #[error("invalid model '{model}': {}", join_errors(.errors))]
    InvalidModel {
        model: String,
        errors: Vec<ValidationError>,
    },

    /// A model with the same name is already registered.
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    /// No model with this name is registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A filter or ordering names a field the model does not have as a column.
    #[error("invalid field '{field}' for model '{model}'")]
    UnknownField { model: String, field: String },

    /// A lookup key carries an operator suffix outside the supported table.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// A filter value has the wrong shape for its operator.
    #[error("invalid value for '{field}': {reason}")]
    InvalidFilterValue { field: String, reason: String },

    /// A name would be interpolated into SQL but is not a plain identifier.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;
