//! Dynamic record instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{Result, SchemaError};
use crate::model::ModelSchema;
use crate::value::Value;

static NULL: Value = Value::Null;

/// An instance of a model: its descriptor plus one value per field.
///
/// A record is *transient* until its primary key is set, which normally
/// happens on the first save. Reference fields hold either a nested
/// [`Record`] or a raw key value; reference-list fields hold a
/// [`Value::List`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ormagic_core::{Field, ModelSchema, Record, Value};
///
/// let user = Arc::new(
///     ModelSchema::builder("User")
///         .field(Field::text("name"))
///         .field(Field::integer("age").default(18))
///         .build()
///         .unwrap(),
/// );
///
/// let record = Record::new(user).with("name", "John");
/// assert!(record.pk().is_none());
/// assert_eq!(record.value("age"), &Value::Integer(18));
/// assert_eq!(record.to_json()["name"], "John");
/// ```
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a transient record with declared defaults applied and empty
    /// many-to-many lists.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let mut values = BTreeMap::new();
        for field in schema.fields() {
            if field.field_type.is_reference_list() {
                values.insert(field.name.clone(), Value::List(Vec::new()));
            } else if let Some(default) = &field.default {
                values.insert(field.name.clone(), default.clone().into());
            }
        }
        Self { schema, values }
    }

    /// Creates a record without any values, not even defaults.
    ///
    /// Fields left unset are skipped when many-to-many relations are synced,
    /// which is how partially loaded records avoid clobbering junction rows.
    pub fn blank(schema: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Sets a field and returns the record, for fluent construction.
    ///
    /// Names that are not fields of the model are kept but ignored by the store.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(field.into(), value.into())
    }

    /// Sets a field after checking that the model declares it.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for undeclared names.
    pub fn try_set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        if self.schema.field(field).is_none() {
            return Err(SchemaError::UnknownField {
                model: self.schema.name().to_string(),
                field: field.to_string(),
            });
        }
        self.values.insert(field.to_string(), value.into());
        Ok(())
    }

    /// The field's value, `None` when it was never set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.values.get_mut(field)
    }

    /// The field's value, [`Value::Null`] when it was never set.
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    /// Removes a field value.
    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Name of the record's model.
    pub fn model(&self) -> &str {
        self.schema.name()
    }

    /// Primary-key value, `None` while the record is transient.
    pub fn pk(&self) -> Option<&Value> {
        self.values
            .get(&self.schema.primary_key().name)
            .filter(|v| !v.is_null())
    }

    pub fn set_pk(&mut self, value: impl Into<Value>) {
        let name = self.schema.primary_key().name.clone();
        self.values.insert(name, value.into());
    }

    /// The nested record behind a reference field, if loaded.
    pub fn related(&self, field: &str) -> Option<&Record> {
        self.get(field).and_then(Value::as_record)
    }

    /// Records of a many-to-many field; empty when unset.
    pub fn related_list(&self, field: &str) -> &[Record] {
        self.get(field).and_then(Value::as_list).unwrap_or(&[])
    }

    /// Field/value pairs in declaration order, skipping unset fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .filter_map(|f| self.values.get(&f.name).map(|v| (f.name.as_str(), v)))
    }

    /// JSON rendering with nested records expanded.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Converts the record into any deserializable type through its JSON form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the shapes do not match.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.schema.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(&field.name, self.value(&field.name))?;
        }
        map.end()
    }
}
