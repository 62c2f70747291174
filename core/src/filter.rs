//! Query predicates.
//!
//! Filters are built from keyword lookups such as `age__gt` or from typed
//! constructors, combined with `&`, `|` and `!`, and compiled against a
//! model into a WHERE fragment plus an ordered parameter list. Values are
//! always bound as parameters; only validated field names reach the SQL
//! text.
//!
//! # Lookup suffixes
//!
//! | suffix | SQL |
//! |---|---|
//! | *(none)* | `=` |
//! | `ne` | `<>` |
//! | `gt` / `gte` / `lt` / `lte` | `>` / `>=` / `<` / `<=` |
//! | `like` / `nlike` | `LIKE` / `NOT LIKE` |
//! | `in` / `nin` | `IN (...)` / `NOT IN (...)` |
//! | `between` / `nbetween` | `BETWEEN ? AND ?` / `NOT BETWEEN ? AND ?` |
//!
//! # Examples
//!
//! ```
//! use ormagic_core::{Field, ModelSchema, Q, Value};
//!
//! let user = ModelSchema::builder("User")
//!     .field(Field::text("name"))
//!     .field(Field::integer("age"))
//!     .build()
//!     .unwrap();
//!
//! let q = Q::lookup("age__gt", 25).unwrap() & !Q::lookup("name__like", "J%").unwrap();
//! let predicate = q.compile(&user, true).unwrap();
//! assert_eq!(predicate.clause, "(age > ? AND NOT (name LIKE ?))");
//! assert_eq!(predicate.params, vec![Value::Integer(25), Value::from("J%")]);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

use crate::error::{Result, SchemaError};
use crate::model::ModelSchema;
use crate::record::Record;
use crate::validate::is_identifier;
use crate::value::Value;

/// Separator between a field name and its operator suffix.
pub const LOOKUP_SEPARATOR: &str = "__";

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
        }
    }

    /// Lookup suffix, `None` for plain equality.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Eq => None,
            Self::Ne => Some("ne"),
            Self::Gt => Some("gt"),
            Self::Gte => Some("gte"),
            Self::Lt => Some("lt"),
            Self::Lte => Some("lte"),
            Self::Like => Some("like"),
            Self::NotLike => Some("nlike"),
            Self::In => Some("in"),
            Self::NotIn => Some("nin"),
            Self::Between => Some("between"),
            Self::NotBetween => Some("nbetween"),
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    fn is_range(&self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }
}

impl FromStr for Operator {
    type Err = SchemaError;

    fn from_str(suffix: &str) -> Result<Self> {
        match suffix {
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "like" => Ok(Self::Like),
            "nlike" => Ok(Self::NotLike),
            "in" => Ok(Self::In),
            "nin" => Ok(Self::NotIn),
            "between" => Ok(Self::Between),
            "nbetween" => Ok(Self::NotBetween),
            other => Err(SchemaError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Splits `"age__gt"` into `("age", Operator::Gt)`; a bare name means equality.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidOperator`] for unknown suffixes.
pub fn split_lookup(key: &str) -> Result<(&str, Operator)> {
    match key.split_once(LOOKUP_SEPARATOR) {
        None => Ok((key, Operator::Eq)),
        Some((field, suffix)) => Ok((field, suffix.parse()?)),
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(Value),
    List(Vec<Value>),
    Range(Value, Value),
}

macro_rules! single_filter_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(v: $ty) -> Self {
                    Self::Single(v.into())
                }
            }
        )*
    };
}

single_filter_value!(i64, i32, u32, bool, f64, &str, String, Value, Record);

impl<T: Into<Value>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for FilterValue {
    fn from(v: [T; N]) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for FilterValue {
    fn from((low, high): (A, B)) -> Self {
        Self::Range(low.into(), high.into())
    }
}

/// One `field <op> value` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

/// Composable boolean filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    Condition(Condition),
    And(Box<Q>, Box<Q>),
    Or(Box<Q>, Box<Q>),
    Not(Box<Q>),
}

impl Q {
    /// Builds a condition, checking that the value shape fits the operator.
    ///
    /// `BETWEEN` also accepts a two-element list.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFilterValue`] when `IN` gets a scalar,
    /// `BETWEEN` gets anything but two values, or a scalar operator gets a list.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FilterValue>) -> Result<Self> {
        let field = field.into();
        let invalid = |reason: &str| SchemaError::InvalidFilterValue {
            field: field.clone(),
            reason: format!("{operator} {reason}"),
        };

        let value = match (operator, value.into()) {
            (op, FilterValue::List(items)) if op.is_list() => FilterValue::List(items),
            (op, _) if op.is_list() => return Err(invalid("expects a list of values")),
            (op, FilterValue::Range(low, high)) if op.is_range() => FilterValue::Range(low, high),
            (op, FilterValue::List(items)) if op.is_range() => {
                let [low, high]: [Value; 2] = items
                    .try_into()
                    .map_err(|_| invalid("expects exactly two values"))?;
                FilterValue::Range(low, high)
            }
            (op, _) if op.is_range() => return Err(invalid("expects exactly two values")),
            (_, FilterValue::Single(v)) => FilterValue::Single(v),
            (_, _) => return Err(invalid("expects a single value")),
        };

        Ok(Self::Condition(Condition {
            field,
            operator,
            value,
        }))
    }

    /// Builds a condition from a keyword lookup such as `"age__gte"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ormagic_core::{Operator, Q};
    ///
    /// let q = Q::lookup("age__in", [20, 30]).unwrap();
    /// assert!(matches!(q, Q::Condition(ref c) if c.operator == Operator::In));
    /// assert!(Q::lookup("age__approx", 1).is_err());
    /// ```
    pub fn lookup(key: &str, value: impl Into<FilterValue>) -> Result<Self> {
        let (field, operator) = split_lookup(key)?;
        Self::new(field, operator, value)
    }

    fn scalar(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            operator,
            value: FilterValue::Single(value.into()),
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::scalar(field, Operator::Lte, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::scalar(field, Operator::Like, pattern.into())
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::scalar(field, Operator::NotLike, pattern.into())
    }

    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            operator: Operator::In,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            operator: Operator::NotIn,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            operator: Operator::Between,
            value: FilterValue::Range(low.into(), high.into()),
        })
    }

    pub fn not_between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            operator: Operator::NotBetween,
            value: FilterValue::Range(low.into(), high.into()),
        })
    }

    /// ANDs all expressions together; `None` for an empty input.
    pub fn all(items: impl IntoIterator<Item = Q>) -> Option<Q> {
        items.into_iter().reduce(|acc, q| acc & q)
    }

    /// ORs all expressions together; `None` for an empty input.
    pub fn any(items: impl IntoIterator<Item = Q>) -> Option<Q> {
        items.into_iter().reduce(|acc, q| acc | q)
    }

    /// Compiles the expression against `model`.
    ///
    /// With `strict` set, every field must be a column of the model; without
    /// it, unknown names are accepted as long as they are plain identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`], [`SchemaError::InvalidIdentifier`]
    /// or [`SchemaError::InvalidFilterValue`].
    pub fn compile(&self, model: &ModelSchema, strict: bool) -> Result<Predicate> {
        let mut predicate = Predicate::default();
        self.write(model, strict, &mut predicate)?;
        Ok(predicate)
    }

    fn write(&self, model: &ModelSchema, strict: bool, out: &mut Predicate) -> Result<()> {
        match self {
            Self::Condition(condition) => condition.write(model, strict, out),
            Self::And(left, right) => Self::write_pair(left, right, "AND", model, strict, out),
            Self::Or(left, right) => Self::write_pair(left, right, "OR", model, strict, out),
            Self::Not(inner) => {
                out.clause.push_str("NOT (");
                inner.write(model, strict, out)?;
                out.clause.push(')');
                Ok(())
            }
        }
    }

    fn write_pair(
        left: &Q,
        right: &Q,
        joiner: &str,
        model: &ModelSchema,
        strict: bool,
        out: &mut Predicate,
    ) -> Result<()> {
        out.clause.push('(');
        left.write(model, strict, out)?;
        out.clause.push(' ');
        out.clause.push_str(joiner);
        out.clause.push(' ');
        right.write(model, strict, out)?;
        out.clause.push(')');
        Ok(())
    }
}

impl Condition {
    fn write(&self, model: &ModelSchema, strict: bool, out: &mut Predicate) -> Result<()> {
        let field = &self.field;
        match model.field(field) {
            Some(f) if f.is_column() => {}
            Some(_) => {
                return Err(SchemaError::UnknownField {
                    model: model.name().to_string(),
                    field: field.clone(),
                });
            }
            None if strict => {
                return Err(SchemaError::UnknownField {
                    model: model.name().to_string(),
                    field: field.clone(),
                });
            }
            None if !is_identifier(field) => {
                return Err(SchemaError::InvalidIdentifier(field.clone()));
            }
            None => {}
        }

        let op = self.operator;
        let fits = match &self.value {
            FilterValue::Single(_) => !op.is_list() && !op.is_range(),
            FilterValue::List(_) => op.is_list(),
            FilterValue::Range(..) => op.is_range(),
        };
        if !fits {
            let shape = match &self.value {
                FilterValue::Single(_) => "a single value",
                FilterValue::List(_) => "a list",
                FilterValue::Range(..) => "a range",
            };
            return Err(SchemaError::InvalidFilterValue {
                field: field.clone(),
                reason: format!("{op} does not accept {shape}"),
            });
        }

        match &self.value {
            FilterValue::Single(value) => {
                out.clause.push_str(&format!("{field} {op} ?"));
                out.params.push(self.param(value)?);
            }
            FilterValue::List(items) if items.is_empty() => {
                // Nothing is IN an empty list.
                let always = if op == Operator::In { "1 = 0" } else { "1 = 1" };
                out.clause.push_str(always);
            }
            FilterValue::List(items) => {
                let placeholders = vec!["?"; items.len()].join(", ");
                out.clause.push_str(&format!("{field} {op} ({placeholders})"));
                for item in items {
                    out.params.push(self.param(item)?);
                }
            }
            FilterValue::Range(low, high) => {
                out.clause.push_str(&format!("{field} {op} ? AND ?"));
                out.params.push(self.param(low)?);
                out.params.push(self.param(high)?);
            }
        }
        Ok(())
    }

    fn param(&self, value: &Value) -> Result<Value> {
        value
            .to_column()
            .ok_or_else(|| SchemaError::InvalidFilterValue {
                field: self.field.clone(),
                reason: "a list of records cannot be compared".to_string(),
            })
    }
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, rhs: Q) -> Q {
        Q::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, rhs: Q) -> Q {
        Q::Or(Box::new(self), Box::new(rhs))
    }
}

impl Not for Q {
    type Output = Q;

    fn not(self) -> Q {
        Q::Not(Box::new(self))
    }
}

/// A compiled WHERE fragment and its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
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
            .field(Field::reference_list("teams", "Team"))
            .build()
            .unwrap()
    }

    fn compile(q: Q) -> Predicate {
        q.compile(&user(), true).unwrap()
    }

    #[test]
    fn test_split_lookup() {
        assert_eq!(split_lookup("age").unwrap(), ("age", Operator::Eq));
        assert_eq!(split_lookup("age__gte").unwrap(), ("age", Operator::Gte));
        assert_eq!(split_lookup("name__nlike").unwrap(), ("name", Operator::NotLike));
        assert!(matches!(
            split_lookup("age__approx"),
            Err(SchemaError::InvalidOperator(op)) if op == "approx"
        ));
        assert!(split_lookup("age__gt__lt").is_err());
    }

    #[test]
    fn test_suffix_round_trips_through_parse() {
        for op in [
            Operator::Ne,
            Operator::Gt,
            Operator::Gte,
            Operator::Lt,
            Operator::Lte,
            Operator::Like,
            Operator::NotLike,
            Operator::In,
            Operator::NotIn,
            Operator::Between,
            Operator::NotBetween,
        ] {
            assert_eq!(op.suffix().unwrap().parse::<Operator>().unwrap(), op);
        }
        assert_eq!(Operator::Eq.suffix(), None);
    }

    #[test]
    fn test_equality() {
        let p = compile(Q::lookup("name", "John").unwrap());
        assert_eq!(p.clause, "name = ?");
        assert_eq!(p.params, vec![Value::from("John")]);
    }

    #[test]
    fn test_in_uses_one_placeholder_per_element() {
        let p = compile(Q::lookup("age__in", vec![20, 25, 30]).unwrap());
        assert_eq!(p.clause, "age IN (?, ?, ?)");
        assert_eq!(p.params.len(), 3);

        let p = compile(Q::lookup("age__nin", [1]).unwrap());
        assert_eq!(p.clause, "age NOT IN (?)");
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(compile(Q::in_list("age", Vec::<i64>::new())).clause, "1 = 0");
        assert_eq!(compile(Q::not_in("age", Vec::<i64>::new())).clause, "1 = 1");
    }

    #[test]
    fn test_between_accepts_pair_or_two_element_list() {
        let p = compile(Q::lookup("age__between", (20, 30)).unwrap());
        assert_eq!(p.clause, "age BETWEEN ? AND ?");
        assert_eq!(p.params, vec![Value::Integer(20), Value::Integer(30)]);

        let p = compile(Q::lookup("age__nbetween", [20, 30]).unwrap());
        assert_eq!(p.clause, "age NOT BETWEEN ? AND ?");

        assert!(Q::lookup("age__between", [1, 2, 3]).is_err());
        assert!(Q::lookup("age__between", 5).is_err());
    }

    #[test]
    fn test_value_shape_mismatch() {
        assert!(Q::lookup("age__in", 5).is_err());
        assert!(Q::lookup("age__gt", vec![1, 2]).is_err());
    }

    #[test]
    fn test_hand_built_condition_shape_is_checked() {
        let in_scalar = Q::Condition(Condition {
            field: "age".into(),
            operator: Operator::In,
            value: FilterValue::Single(Value::Integer(3)),
        });
        assert!(matches!(
            in_scalar.compile(&user(), true),
            Err(SchemaError::InvalidFilterValue { .. })
        ));

        let eq_list = Q::Condition(Condition {
            field: "age".into(),
            operator: Operator::Eq,
            value: FilterValue::List(vec![Value::Integer(1), Value::Integer(2)]),
        });
        assert!(eq_list.compile(&user(), true).is_err());

        let between_list = Q::Condition(Condition {
            field: "age".into(),
            operator: Operator::Between,
            value: FilterValue::List(vec![Value::Integer(1), Value::Integer(2)]),
        });
        assert!(between_list.compile(&user(), true).is_err());
    }

    #[test]
    fn test_boolean_composition_accumulates_params_in_order() {
        let q = (Q::eq("name", "a") | Q::eq("name", "b")) & !Q::gt("age", 40);
        let p = compile(q);
        assert_eq!(p.clause, "((name = ? OR name = ?) AND NOT (age > ?))");
        assert_eq!(
            p.params,
            vec![Value::from("a"), Value::from("b"), Value::Integer(40)]
        );
    }

    #[test]
    fn test_all_and_any() {
        assert!(Q::all(Vec::new()).is_none());
        let q = Q::all([Q::gt("age", 1), Q::lt("age", 9)]).unwrap();
        assert_eq!(compile(q).clause, "(age > ? AND age < ?)");
        let q = Q::any([Q::eq("age", 1), Q::eq("age", 2), Q::eq("age", 3)]).unwrap();
        assert_eq!(compile(q).clause, "((age = ? OR age = ?) OR age = ?)");
    }

    #[test]
    fn test_injection_text_is_bound_not_interpolated() {
        let p = compile(Q::eq("name", "x' OR 1=1 --"));
        assert_eq!(p.clause, "name = ?");
        assert_eq!(p.params, vec![Value::from("x' OR 1=1 --")]);
    }

    #[test]
    fn test_unknown_field_strict_and_lenient() {
        let q = Q::eq("height", 1);
        assert!(matches!(
            q.compile(&user(), true),
            Err(SchemaError::UnknownField { .. })
        ));
        assert_eq!(q.compile(&user(), false).unwrap().clause, "height = ?");

        let q = Q::eq("1; DROP TABLE user", 1);
        assert!(matches!(
            q.compile(&user(), false),
            Err(SchemaError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_reference_list_is_not_filterable() {
        let q = Q::eq("teams", 1);
        assert!(q.compile(&user(), false).is_err());
    }
}
