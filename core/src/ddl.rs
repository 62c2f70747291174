//! DDL generation from model descriptors.
//!
//! Translates fields into SQLite column definitions and foreign-key clauses,
//! and renders the `CREATE`/`ALTER`/`DROP TABLE` statements used by the
//! store. Only identifiers that passed model validation are interpolated;
//! default values are quoted with embedded quotes doubled.
//!
//! # Column shape
//!
//! ```text
//! <name> <INTEGER|TEXT> [PRIMARY KEY] [DEFAULT '<v>'] [NOT NULL] [UNIQUE]
//! ```
//!
//! Foreign keys are emitted as table constraints after all columns:
//!
//! ```text
//! FOREIGN KEY (<name>) REFERENCES <table>(<pk>) ON UPDATE <action> ON DELETE <action>
//! ```

use std::fmt;

use crate::error::Result;
use crate::model::{Field, FieldType, ModelSchema, Registry};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Maps a semantic type to its storage type.
///
/// Relations store the referenced primary key and are always `INTEGER`.
pub fn sql_type(field_type: &FieldType) -> SqlType {
    match field_type {
        FieldType::Text => SqlType::Text,
        FieldType::Integer | FieldType::Reference(_) | FieldType::ReferenceList(_) => {
            SqlType::Integer
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders the column definition of one field, without foreign-key clauses.
///
/// # Examples
///
/// ```
/// use ormagic_core::{Field, column_definition};
///
/// assert_eq!(column_definition(&Field::text("name").unique()), "name TEXT NOT NULL UNIQUE");
/// assert_eq!(column_definition(&Field::integer("age").default(18)), "age INTEGER DEFAULT '18'");
/// assert_eq!(column_definition(&Field::integer("id").primary_key()), "id INTEGER PRIMARY KEY");
/// ```
pub fn column_definition(field: &Field) -> String {
    let mut def = format!("{} {}", field.name, sql_type(&field.field_type));
    if field.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if let Some(default) = &field.default {
        def.push_str(" DEFAULT ");
        def.push_str(&quote(&default.to_string()));
    }
    if field.is_not_null() {
        def.push_str(" NOT NULL");
    }
    if field.unique {
        def.push_str(" UNIQUE");
    }
    def
}

/// The `REFERENCES ...` part shared by table and column constraints.
fn references_clause(field: &Field, registry: &Registry) -> Result<Option<String>> {
    let FieldType::Reference(target) = &field.field_type else {
        return Ok(None);
    };
    let target = registry.get(target)?;
    let action = field.on_delete.as_sql();
    Ok(Some(format!(
        "REFERENCES {}({}) ON UPDATE {action} ON DELETE {action}",
        target.table(),
        target.primary_key().name
    )))
}

/// Renders the `FOREIGN KEY` table constraint of a reference field.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownModel`](crate::SchemaError::UnknownModel) if
/// the target is not registered.
pub fn foreign_key_clause(field: &Field, registry: &Registry) -> Result<Option<String>> {
    Ok(references_clause(field, registry)?
        .map(|references| format!("FOREIGN KEY ({}) {references}", field.name)))
}

/// Renders `CREATE TABLE IF NOT EXISTS` for a model.
///
/// Many-to-many fields produce no column; their junction tables are created
/// separately with [`create_junction_sql`].
pub fn create_table_sql(model: &ModelSchema, registry: &Registry) -> Result<String> {
    let mut parts: Vec<String> = model.columns().map(column_definition).collect();
    for field in model.references() {
        if let Some(clause) = foreign_key_clause(field, registry)? {
            parts.push(clause);
        }
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        model.table(),
        parts.join(", ")
    ))
}

/// Renders `ALTER TABLE ... ADD COLUMN` with the full column definition.
///
/// SQLite only accepts an inline `REFERENCES` constraint here.
pub fn add_column_sql(model: &ModelSchema, field: &Field, registry: &Registry) -> Result<String> {
    let mut def = column_definition(field);
    if let Some(references) = references_clause(field, registry)? {
        def.push(' ');
        def.push_str(&references);
    }
    Ok(format!("ALTER TABLE {} ADD COLUMN {def}", model.table()))
}

pub fn rename_column_sql(table: &str, from: &str, to: &str) -> String {
    format!("ALTER TABLE {table} RENAME COLUMN {from} TO {to}")
}

pub fn drop_column_sql(table: &str, column: &str) -> String {
    format!("ALTER TABLE {table} DROP COLUMN {column}")
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

/// Junction table name for a first-time creation from `owner`'s side.
///
/// Existing junction tables must be looked up under both orderings instead.
pub fn junction_table_name(owner: &ModelSchema, related: &ModelSchema) -> String {
    format!("{}_{}", owner.table(), related.table())
}

/// Name of the junction column holding `model`'s key.
pub fn junction_column(model: &ModelSchema) -> String {
    format!("{}_id", model.table())
}

/// Renders the junction table bridging `owner` and `related`.
///
/// # Examples
///
/// ```
/// use ormagic_core::{create_junction_sql, Field, ModelSchema};
///
/// let user = ModelSchema::builder("User").build().unwrap();
/// let team = ModelSchema::builder("Team").field(Field::text("name")).build().unwrap();
/// assert_eq!(
///     create_junction_sql(&user, &team),
///     "CREATE TABLE IF NOT EXISTS user_team (id INTEGER PRIMARY KEY, user_id INTEGER, \
///      team_id INTEGER, FOREIGN KEY (user_id) REFERENCES user(id) ON DELETE CASCADE, \
///      FOREIGN KEY (team_id) REFERENCES team(id) ON DELETE CASCADE)"
/// );
/// ```
pub fn create_junction_sql(owner: &ModelSchema, related: &ModelSchema) -> String {
    let left = junction_column(owner);
    let right = junction_column(related);
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (id INTEGER PRIMARY KEY, {left} INTEGER, {right} INTEGER, \
         FOREIGN KEY ({left}) REFERENCES {owner_table}({owner_pk}) ON DELETE CASCADE, \
         FOREIGN KEY ({right}) REFERENCES {related_table}({related_pk}) ON DELETE CASCADE)",
        name = junction_table_name(owner, related),
        owner_table = owner.table(),
        owner_pk = owner.primary_key().name,
        related_table = related.table(),
        related_pk = related.primary_key().name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OnDelete;
    use crate::SchemaError;

    fn registry() -> Registry {
        Registry::from_models([
            ModelSchema::builder("User")
                .field(Field::text("name"))
                .build()
                .unwrap(),
            ModelSchema::builder("Post")
                .field(Field::text("title"))
                .field(
                    Field::reference("author", "User")
                        .nullable()
                        .on_delete(OnDelete::SetNull),
                )
                .field(Field::integer("views").default(0))
                .build()
                .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_sql_type() {
        assert_eq!(sql_type(&FieldType::Integer), SqlType::Integer);
        assert_eq!(sql_type(&FieldType::Text), SqlType::Text);
        assert_eq!(sql_type(&FieldType::Reference("User".into())), SqlType::Integer);
        assert_eq!(sql_type(&FieldType::ReferenceList("User".into())), SqlType::Integer);
    }

    #[test]
    fn test_default_is_quoted_and_escaped() {
        let field = Field::text("motto").default("it's fine");
        assert_eq!(column_definition(&field), "motto TEXT DEFAULT 'it''s fine'");
    }

    #[test]
    fn test_nullable_column_has_no_not_null() {
        assert_eq!(column_definition(&Field::integer("age").nullable()), "age INTEGER");
    }

    #[test]
    fn test_create_table_places_foreign_keys_after_columns() {
        let registry = registry();
        let post = registry.get("Post").unwrap();
        assert_eq!(
            create_table_sql(post, &registry).unwrap(),
            "CREATE TABLE IF NOT EXISTS post (id INTEGER PRIMARY KEY, title TEXT NOT NULL, \
             author INTEGER, views INTEGER DEFAULT '0', \
             FOREIGN KEY (author) REFERENCES user(id) ON UPDATE SET NULL ON DELETE SET NULL)"
        );
    }

    #[test]
    fn test_add_column_inlines_reference() {
        let registry = registry();
        let post = registry.get("Post").unwrap();
        let author = post.field("author").unwrap();
        assert_eq!(
            add_column_sql(post, author, &registry).unwrap(),
            "ALTER TABLE post ADD COLUMN author INTEGER \
             REFERENCES user(id) ON UPDATE SET NULL ON DELETE SET NULL"
        );
    }

    #[test]
    fn test_foreign_key_to_unregistered_model() {
        let registry = Registry::new();
        let field = Field::reference("owner", "Ghost");
        assert!(matches!(
            foreign_key_clause(&field, &registry),
            Err(SchemaError::UnknownModel(_))
        ));
        assert_eq!(foreign_key_clause(&Field::text("x"), &registry).unwrap(), None);
    }

    #[test]
    fn test_alter_statements() {
        assert_eq!(
            rename_column_sql("user", "name", "full_name"),
            "ALTER TABLE user RENAME COLUMN name TO full_name"
        );
        assert_eq!(drop_column_sql("user", "age"), "ALTER TABLE user DROP COLUMN age");
        assert_eq!(drop_table_sql("user"), "DROP TABLE IF EXISTS user");
    }
}
