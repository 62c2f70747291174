//! Dynamic values carried by records, filters and statement parameters.

use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::record::Record;

/// A single field value.
///
/// Scalar variants map one-to-one onto SQLite storage classes. `Record`
/// holds a related record behind a foreign key and `List` holds the records
/// of a many-to-many relation; both collapse to primary keys before they
/// reach the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL `NULL`, also used for "not set".
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// A related record referenced through a foreign key.
    Record(Box<Record>),
    /// Related records of a many-to-many relation.
    List(Vec<Record>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Reduces the value to what a column stores.
    ///
    /// A nested record becomes its primary key (or `NULL` while unsaved).
    /// Returns `None` for lists, which never map to a single column.
    pub fn to_column(&self) -> Option<Value> {
        match self {
            Self::Record(record) => Some(record.pk().cloned().unwrap_or(Value::Null)),
            Self::List(_) => None,
            scalar => Some(scalar.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Record(r) => match r.pk() {
                Some(pk) => write!(f, "{}({pk})", r.model()),
                None => write!(f, "{}(unsaved)", r.model()),
            },
            Self::List(items) => write!(f, "[{} records]", items.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(v) => serializer.serialize_i64(*v),
            Self::Real(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Record(r) => r.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(Box::new(v))
    }
}

impl From<Vec<Record>> for Value {
    fn from(v: Vec<Record>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A literal column default, as written in a model declaration.
///
/// # Examples
///
/// ```
/// use ormagic_core::Literal;
///
/// let lit: Literal = serde_json::from_str("10").unwrap();
/// assert_eq!(lit, Literal::Integer(10));
/// assert_eq!(lit.to_string(), "10");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<Literal> for Value {
    fn from(v: Literal) -> Self {
        match v {
            Literal::Integer(i) => Self::Integer(i),
            Literal::Real(r) => Self::Real(r),
            Literal::Text(t) => Self::Text(t),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}
