//! Conversion between record values and SQLite values.

use ormagic_core::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::error::{Result, SqliteError};

/// Converts a value to what SQLite binds.
///
/// Nested records bind their primary key. Lists cannot be bound.
pub(crate) fn to_sql(value: &Value) -> Result<SqlValue> {
    let column = value.to_column().ok_or_else(|| {
        SqliteError::ConversionError("a list of records cannot be bound to a column".to_string())
    })?;
    Ok(match column {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(v),
        Value::Real(v) => SqlValue::Real(v),
        Value::Text(v) => SqlValue::Text(v),
        Value::Record(_) | Value::List(_) => SqlValue::Null,
    })
}

pub(crate) fn to_sql_params(values: &[Value]) -> Result<Vec<SqlValue>> {
    values.iter().map(to_sql).collect()
}

/// Converts a column read back from SQLite.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| SqliteError::ConversionError(format!("invalid UTF-8 text: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(_) => {
            return Err(SqliteError::ConversionError(
                "BLOB columns are not supported".to_string(),
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_bind_as_is() {
        assert_eq!(to_sql(&Value::Null).unwrap(), SqlValue::Null);
        assert_eq!(to_sql(&Value::from(3)).unwrap(), SqlValue::Integer(3));
        assert_eq!(to_sql(&Value::from("x")).unwrap(), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_list_cannot_bind() {
        assert!(matches!(
            to_sql(&Value::List(Vec::new())),
            Err(SqliteError::ConversionError(_))
        ));
    }

    #[test]
    fn test_from_sql() {
        assert_eq!(from_sql(ValueRef::Integer(7)).unwrap(), Value::Integer(7));
        assert_eq!(from_sql(ValueRef::Text(b"abc")).unwrap(), Value::from("abc"));
        assert_eq!(from_sql(ValueRef::Null).unwrap(), Value::Null);
        assert!(from_sql(ValueRef::Blob(b"\x00")).is_err());
    }
}
