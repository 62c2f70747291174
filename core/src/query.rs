//! Select queries: filter, ordering and paging.

use std::fmt;

use crate::error::{Result, SchemaError};
use crate::filter::{FilterValue, Predicate, Q};
use crate::model::ModelSchema;
use crate::value::Value;

/// Keys consumed by [`Query::from_pairs`] instead of becoming conditions.
pub const RESERVED_KEYS: [&str; 3] = ["order_by", "limit", "offset"];

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    /// Parses `"age"` (ascending) or `"-age"` (descending).
    pub fn parse(term: &str) -> Self {
        match term.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: term.to_string(),
                descending: false,
            },
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} DESC", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

/// A filter plus ordering and paging options.
///
/// # Examples
///
/// ```
/// use ormagic_core::{Field, ModelSchema, Q, Query};
///
/// let user = ModelSchema::builder("User")
///     .field(Field::text("name"))
///     .field(Field::integer("age"))
///     .build()
///     .unwrap();
///
/// let query = Query::new()
///     .filter(Q::gt("age", 25))
///     .order_by("-age")
///     .order_by("name")
///     .limit(10);
/// let (sql, params) = query.select_sql(&user, true).unwrap();
/// assert_eq!(sql, "SELECT * FROM user WHERE age > ? ORDER BY age DESC, name LIMIT 10");
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Option<Q>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter, ANDed with any existing one.
    pub fn filter(mut self, q: Q) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    /// Adds a keyword lookup such as `("age__gte", 18)`.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`Q::lookup`].
    pub fn lookup(self, key: &str, value: impl Into<FilterValue>) -> Result<Self> {
        Ok(self.filter(Q::lookup(key, value)?))
    }

    /// Appends an ordering term; a leading `-` sorts descending.
    pub fn order_by(mut self, term: &str) -> Self {
        self.order_by.push(OrderBy::parse(term));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn filter_expr(&self) -> Option<&Q> {
        self.filter.as_ref()
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Builds a query from keyword pairs.
    ///
    /// `order_by` takes a field term, a comma-separated list of terms or a
    /// list of values; `limit` and `offset` take integers. Every other key is
    /// a lookup, and all lookups are ANDed.
    ///
    /// # Examples
    ///
    /// ```
    /// use ormagic_core::{FilterValue, Query};
    ///
    /// let query = Query::from_pairs([
    ///     ("age__gt", FilterValue::from(25)),
    ///     ("order_by", FilterValue::from("-age,name")),
    ///     ("limit", FilterValue::from(5)),
    /// ])
    /// .unwrap();
    /// assert_eq!(query.ordering().len(), 2);
    /// assert_eq!(query.limit_value(), Some(5));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFilterValue`] for malformed reserved
    /// values and propagates lookup errors.
    pub fn from_pairs<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, FilterValue)>) -> Result<Self> {
        let mut query = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            match key {
                "order_by" => {
                    for term in order_terms(value)? {
                        query = query.order_by(&term);
                    }
                }
                "limit" => query.limit = Some(reserved_integer(key, value)?),
                "offset" => query.offset = Some(reserved_integer(key, value)?),
                _ => query = query.lookup(key, value)?,
            }
        }
        Ok(query)
    }

    /// Compiles the WHERE clause, `None` without a filter.
    pub fn predicate(&self, model: &ModelSchema, strict: bool) -> Result<Option<Predicate>> {
        self.filter
            .as_ref()
            .map(|q| q.compile(model, strict))
            .transpose()
    }

    /// Renders `SELECT * FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT ..] [OFFSET ..]`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for ordering on a non-column and
    /// propagates predicate errors.
    pub fn select_sql(&self, model: &ModelSchema, strict: bool) -> Result<(String, Vec<Value>)> {
        let mut sql = format!("SELECT * FROM {}", model.table());
        let params = self.write_where(&mut sql, model, strict)?;

        if !self.order_by.is_empty() {
            for term in &self.order_by {
                if !model.field(&term.field).is_some_and(|f| f.is_column()) {
                    return Err(SchemaError::UnknownField {
                        model: model.name().to_string(),
                        field: term.field.clone(),
                    });
                }
            }
            let terms: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite has no OFFSET without LIMIT.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok((sql, params))
    }

    /// Renders `SELECT COUNT(*) FROM <table> [WHERE ..]`, ignoring ordering and paging.
    pub fn count_sql(&self, model: &ModelSchema, strict: bool) -> Result<(String, Vec<Value>)> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", model.table());
        let params = self.write_where(&mut sql, model, strict)?;
        Ok((sql, params))
    }

    fn write_where(&self, sql: &mut String, model: &ModelSchema, strict: bool) -> Result<Vec<Value>> {
        match self.predicate(model, strict)? {
            Some(predicate) => {
                sql.push_str(" WHERE ");
                sql.push_str(&predicate.clause);
                Ok(predicate.params)
            }
            None => Ok(Vec::new()),
        }
    }
}

fn order_terms(value: FilterValue) -> Result<Vec<String>> {
    let invalid = || SchemaError::InvalidFilterValue {
        field: "order_by".to_string(),
        reason: "expects field names".to_string(),
    };
    let values = match value {
        FilterValue::Single(v) => vec![v],
        FilterValue::List(items) => items,
        FilterValue::Range(a, b) => vec![a, b],
    };
    let mut terms = Vec::new();
    for v in values {
        let text = v.as_str().ok_or_else(invalid)?;
        terms.extend(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }
    Ok(terms)
}

fn reserved_integer(key: &str, value: FilterValue) -> Result<u64> {
    let invalid = || SchemaError::InvalidFilterValue {
        field: key.to_string(),
        reason: "expects a non-negative integer".to_string(),
    };
    match value {
        FilterValue::Single(Value::Integer(n)) => u64::try_from(n).map_err(|_| invalid()),
        FilterValue::Single(Value::Text(s)) => s.trim().parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;

    fn user() -> ModelSchema {
        ModelSchema::builder("User")
            .field(Field::text("name"))
            .field(Field::integer("age"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_plain_select() {
        let (sql, params) = Query::new().select_sql(&user(), true).unwrap();
        assert_eq!(sql, "SELECT * FROM user");
        assert!(params.is_empty());
    }

    #[test]
    fn test_filters_are_anded() {
        let query = Query::new()
            .lookup("age__gt", 25)
            .unwrap()
            .lookup("age__lte", 35)
            .unwrap();
        let (sql, params) = query.select_sql(&user(), true).unwrap();
        assert_eq!(sql, "SELECT * FROM user WHERE (age > ? AND age <= ?)");
        assert_eq!(params, vec![Value::Integer(25), Value::Integer(35)]);
    }

    #[test]
    fn test_offset_without_limit() {
        let (sql, _) = Query::new().offset(3).select_sql(&user(), true).unwrap();
        assert_eq!(sql, "SELECT * FROM user LIMIT -1 OFFSET 3");

        let (sql, _) = Query::new().limit(2).offset(3).select_sql(&user(), true).unwrap();
        assert_eq!(sql, "SELECT * FROM user LIMIT 2 OFFSET 3");
    }

    #[test]
    fn test_order_by_unknown_field_is_rejected() {
        let err = Query::new()
            .order_by("-height")
            .select_sql(&user(), true)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { field, .. } if field == "height"));
    }

    #[test]
    fn test_from_pairs_consumes_reserved_keys() {
        let query = Query::from_pairs([
            ("name", FilterValue::from("John")),
            ("order_by", FilterValue::from(vec!["-age", "name"])),
            ("limit", FilterValue::from("2")),
            ("offset", FilterValue::from(1)),
        ])
        .unwrap();
        let (sql, params) = query.select_sql(&user(), true).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM user WHERE name = ? ORDER BY age DESC, name LIMIT 2 OFFSET 1"
        );
        assert_eq!(params, vec![Value::from("John")]);
    }

    #[test]
    fn test_from_pairs_rejects_bad_reserved_values() {
        assert!(Query::from_pairs([("limit", FilterValue::from(-1))]).is_err());
        assert!(Query::from_pairs([("order_by", FilterValue::from(3))]).is_err());
        assert!(Query::from_pairs([("age__near", FilterValue::from(3))]).is_err());
    }

    #[test]
    fn test_count_sql_ignores_paging() {
        let query = Query::new().filter(Q::eq("name", "a")).limit(1).order_by("age");
        let (sql, _) = query.count_sql(&user(), true).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM user WHERE name = ?");
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(
            OrderBy::parse("-age"),
            OrderBy {
                field: "age".into(),
                descending: true
            }
        );
        assert_eq!(OrderBy::parse("age").to_string(), "age");
        assert_eq!(OrderBy::parse("-age").to_string(), "age DESC");
    }
}
