//! Model and field descriptors.
//!
//! A [`ModelSchema`] is built once, through [`ModelBuilder`] or by
//! deserializing a model file, and then shared as `Arc<ModelSchema>` through
//! a [`Registry`]. Everything downstream (DDL, predicates, persistence)
//! reads field metadata from these descriptors instead of reflecting on
//! user types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::filter::{FilterValue, Q};
use crate::validate::{ValidationError, validate_model, validate_registry};
use crate::value::Literal;

/// Semantic type of a field.
///
/// In model files the scalar types are written `integer` / `text` and the
/// relations as `{reference: Model}` / `{reference_list: Model}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldTypeRepr", into = "FieldTypeRepr")]
pub enum FieldType {
    Integer,
    Text,
    /// Foreign key to one record of the named model.
    Reference(String),
    /// Many-to-many relation to the named model, stored in a junction table.
    ReferenceList(String),
}

/// Model-file spelling of [`FieldType`]: a bare scalar name or a one-key map.
#[derive(Serialize, Deserialize)]
#[serde(untagged, expecting = "`integer`, `text`, `{reference: Model}` or `{reference_list: Model}`")]
enum FieldTypeRepr {
    Scalar(ScalarType),
    Reference { reference: String },
    ReferenceList { reference_list: String },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScalarType {
    Integer,
    Text,
}

impl From<FieldTypeRepr> for FieldType {
    fn from(repr: FieldTypeRepr) -> Self {
        match repr {
            FieldTypeRepr::Scalar(ScalarType::Integer) => Self::Integer,
            FieldTypeRepr::Scalar(ScalarType::Text) => Self::Text,
            FieldTypeRepr::Reference { reference } => Self::Reference(reference),
            FieldTypeRepr::ReferenceList { reference_list } => Self::ReferenceList(reference_list),
        }
    }
}

impl From<FieldType> for FieldTypeRepr {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer => Self::Scalar(ScalarType::Integer),
            FieldType::Text => Self::Scalar(ScalarType::Text),
            FieldType::Reference(reference) => Self::Reference { reference },
            FieldType::ReferenceList(reference_list) => Self::ReferenceList { reference_list },
        }
    }
}

impl FieldType {
    /// Name of the related model for relation types.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Reference(target) | Self::ReferenceList(target) => Some(target),
            Self::Integer | Self::Text => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    pub fn is_reference_list(&self) -> bool {
        matches!(self, Self::ReferenceList(_))
    }
}

/// Referential action applied on update and delete of the referenced row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnDelete {
    #[default]
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL", alias = "SET_NULL")]
    SetNull,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "SET DEFAULT", alias = "SET_DEFAULT")]
    SetDefault,
    #[serde(rename = "NO ACTION", alias = "NO_ACTION")]
    NoAction,
}

impl OnDelete {
    /// SQL spelling of the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

fn default_required() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// One named, typed attribute of a model.
///
/// Fields are required (`NOT NULL`) unless marked [`nullable`](Self::nullable)
/// or given a [`default`](Self::default).
///
/// # Examples
///
/// ```
/// use ormagic_core::{Field, FieldType, OnDelete};
///
/// let author = Field::reference("author", "User").nullable().on_delete(OnDelete::SetNull);
/// assert_eq!(author.field_type, FieldType::Reference("User".into()));
/// assert!(!author.required);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    #[serde(default)]
    pub on_delete: OnDelete,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let required = !field_type.is_reference_list();
        Self {
            name: name.into(),
            field_type,
            required,
            default: None,
            unique: false,
            primary_key: false,
            on_delete: OnDelete::default(),
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    /// Foreign key to `target`.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldType::Reference(target.into()))
    }

    /// Many-to-many relation to `target`.
    pub fn reference_list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldType::ReferenceList(target.into()))
    }

    pub fn nullable(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default(mut self, value: impl Into<Literal>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this field as the primary key. The implicit `id` is then not added.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = false;
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    /// Whether the field maps to a physical column.
    pub fn is_column(&self) -> bool {
        !self.field_type.is_reference_list()
    }

    /// Whether the column carries a `NOT NULL` constraint.
    pub fn is_not_null(&self) -> bool {
        self.required && self.default.is_none() && !self.primary_key && self.is_column()
    }
}

/// Unvalidated model declaration.
///
/// Also the serde representation of a model in model files:
///
/// ```yaml
/// name: Post
/// fields:
///   - name: title
///     type: text
///   - name: author
///     type: { reference: User }
///     on_delete: SET NULL
///     required: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelBuilder {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates the declaration and produces the model descriptor.
    ///
    /// Without an explicit primary key an auto-incrementing `id INTEGER`
    /// primary key is prepended.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidModel`] listing every validation error.
    pub fn build(self) -> Result<ModelSchema> {
        let Self { name, mut fields } = self;
        if !fields.iter().any(|f| f.primary_key) {
            fields.insert(0, Field::integer("id").primary_key());
        }

        let errors = validate_model(&name, &fields);
        if !errors.is_empty() {
            return Err(SchemaError::InvalidModel {
                model: name,
                errors,
            });
        }

        let primary_key = fields
            .iter()
            .position(|f| f.primary_key)
            .ok_or_else(|| SchemaError::InvalidModel {
                model: name.clone(),
                errors: vec![ValidationError::MissingPrimaryKey],
            })?;

        Ok(ModelSchema {
            table: name.to_lowercase(),
            name,
            fields,
            primary_key,
        })
    }
}

impl From<ModelSchema> for ModelBuilder {
    fn from(schema: ModelSchema) -> Self {
        Self {
            name: schema.name,
            fields: schema.fields,
        }
    }
}

/// Validated, immutable description of a model and its table.
///
/// # Examples
///
/// ```
/// use ormagic_core::{Field, ModelSchema};
///
/// let user = ModelSchema::builder("User")
///     .field(Field::text("name").unique())
///     .field(Field::integer("age"))
///     .build()
///     .unwrap();
///
/// assert_eq!(user.table(), "user");
/// assert_eq!(user.primary_key().name, "id");
/// assert_eq!(user.column_names(), vec!["id", "name", "age"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelBuilder", into = "ModelBuilder")]
pub struct ModelSchema {
    name: String,
    table: String,
    fields: Vec<Field>,
    primary_key: usize,
}

impl TryFrom<ModelBuilder> for ModelSchema {
    type Error = SchemaError;

    fn try_from(builder: ModelBuilder) -> Result<Self> {
        builder.build()
    }
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, derived from the model name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All fields in declaration order, the primary key included.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> &Field {
        &self.fields[self.primary_key]
    }

    /// Fields that map to a physical column, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_column())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns().map(|f| f.name.as_str()).collect()
    }

    /// Foreign-key fields.
    pub fn references(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.field_type.is_reference())
    }

    /// Many-to-many fields.
    pub fn reference_lists(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.field_type.is_reference_list())
    }

    /// Builds a keyword lookup checked against this model's columns.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] when the field is not a column,
    /// plus any error of [`Q::lookup`].
    pub fn lookup(&self, key: &str, value: impl Into<FilterValue>) -> Result<Q> {
        let q = Q::lookup(key, value)?;
        if let Q::Condition(condition) = &q {
            if !self.field(&condition.field).is_some_and(Field::is_column) {
                return Err(SchemaError::UnknownField {
                    model: self.name.clone(),
                    field: condition.field.clone(),
                });
            }
        }
        Ok(q)
    }
}

/// Set of models known to a store, keyed by model name.
///
/// Relations name their target model; the registry resolves those names.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: BTreeMap<String, Arc<ModelSchema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every model and validates cross-model references.
    pub fn from_models(models: impl IntoIterator<Item = ModelSchema>) -> Result<Self> {
        let mut registry = Self::new();
        for model in models {
            registry.register(model)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Adds a model. Reference targets may be registered later.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateModel`] if the name is taken.
    pub fn register(&mut self, model: ModelSchema) -> Result<Arc<ModelSchema>> {
        if self.models.contains_key(model.name()) {
            return Err(SchemaError::DuplicateModel(model.name().to_string()));
        }
        let model = Arc::new(model);
        self.models
            .insert(model.name().to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Looks up a model by name.
    pub fn get(&self, name: &str) -> Result<&Arc<ModelSchema>> {
        self.models
            .get(name)
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelSchema>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Checks that every relation points at a registered model and that no
    /// two models share a table.
    pub fn validate(&self) -> Result<()> {
        let errors = validate_registry(self);
        match errors.into_iter().next() {
            None => Ok(()),
            Some((model, errors)) => Err(SchemaError::InvalidModel { model, errors }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ModelSchema {
        ModelSchema::builder("User")
            .field(Field::text("name").unique())
            .field(Field::integer("age").nullable())
            .build()
            .unwrap()
    }

    #[test]
    fn test_implicit_primary_key_is_prepended() {
        let model = user();
        assert_eq!(model.fields()[0].name, "id");
        assert!(model.primary_key().primary_key);
        assert_eq!(model.primary_key().field_type, FieldType::Integer);
    }

    #[test]
    fn test_explicit_primary_key_replaces_id() {
        let model = ModelSchema::builder("User")
            .field(Field::text("uuid").primary_key())
            .field(Field::text("name"))
            .build()
            .unwrap();
        assert!(model.field("id").is_none());
        assert_eq!(model.primary_key().name, "uuid");
        assert_eq!(model.column_names(), vec!["uuid", "name"]);
    }

    #[test]
    fn test_reference_lists_are_not_columns() {
        let model = ModelSchema::builder("User")
            .field(Field::text("name"))
            .field(Field::reference_list("teams", "Team"))
            .build()
            .unwrap();
        assert_eq!(model.column_names(), vec!["id", "name"]);
        assert_eq!(model.reference_lists().count(), 1);
        assert!(!model.field("teams").unwrap().required);
    }

    #[test]
    fn test_table_name_is_lowercased_model_name() {
        assert_eq!(user().table(), "user");
    }

    #[test]
    fn test_lookup_rejects_unknown_field() {
        let err = user().lookup("height__gt", 3).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
        assert!(user().lookup("age__gt", 3).is_ok());
    }

    #[test]
    fn test_registry_rejects_duplicates_and_unknown_targets() {
        let mut registry = Registry::new();
        registry.register(user()).unwrap();
        assert!(matches!(
            registry.register(user()),
            Err(SchemaError::DuplicateModel(_))
        ));

        let post = ModelSchema::builder("Post")
            .field(Field::reference("author", "Author"))
            .build()
            .unwrap();
        registry.register(post).unwrap();
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_model_deserializes_from_json() {
        let json = r#"{
            "name": "Post",
            "fields": [
                {"name": "title", "type": "text"},
                {"name": "author", "type": {"reference": "User"}, "required": false, "on_delete": "SET NULL"}
            ]
        }"#;
        let model: ModelSchema = serde_json::from_str(json).unwrap();
        assert_eq!(model.column_names(), vec!["id", "title", "author"]);
        let author = model.field("author").unwrap();
        assert_eq!(author.on_delete, OnDelete::SetNull);
        assert!(!author.required);
    }

    #[test]
    fn test_model_deserializes_from_yaml() {
        let yaml = "
name: User
fields:
  - name: name
    type: text
  - name: manager
    type:
      reference: User
    required: false
    on_delete: SET NULL
  - name: teams
    type: {reference_list: Team}
";
        let model: ModelSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            model.field("manager").unwrap().field_type,
            FieldType::Reference("User".into())
        );
        assert_eq!(
            model.field("teams").unwrap().field_type,
            FieldType::ReferenceList("Team".into())
        );
        assert_eq!(model.column_names(), vec!["id", "name", "manager"]);

        let written = serde_yaml::to_string(&model).unwrap();
        assert!(written.contains("reference: User"));
        let reread: ModelSchema = serde_yaml::from_str(&written).unwrap();
        assert_eq!(reread.fields(), model.fields());
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        let yaml = "name: User\nfields:\n  - name: score\n    type: float\n";
        assert!(serde_yaml::from_str::<ModelSchema>(yaml).is_err());
    }

    #[test]
    fn test_invalid_model_fails_to_deserialize() {
        let json = r#"{"name": "Bad", "fields": [{"name": "a b", "type": "text"}]}"#;
        assert!(serde_json::from_str::<ModelSchema>(json).is_err());
    }
}
