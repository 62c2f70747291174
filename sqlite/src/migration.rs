//! Bringing existing tables in line with their models.
//!
//! [`plan_migration`] compares the physical columns of a table with the
//! model's columns and returns the steps needed to reconcile them:
//!
//! - the same set of names needs nothing;
//! - the same number of columns is treated as renames, pairing the names
//!   only the table has with the names only the model has, in order;
//! - otherwise columns only the table has are dropped and columns only the
//!   model has are added.
//!
//! [`Store::update_table`] applies the plan, creating the table when it is
//! missing. Calling it again with an unchanged model issues no statements.
//!
//! # Example
//!
//! ```
//! use ormagic_core::{Field, ModelSchema};
//! use ormagic_sqlite::{MigrationStep, plan_migration};
//!
//! let user = ModelSchema::builder("User")
//!     .field(Field::text("full_name"))
//!     .build()
//!     .unwrap();
//! let existing = vec!["id".to_string(), "name".to_string()];
//!
//! assert_eq!(
//!     plan_migration(&existing, &user),
//!     vec![MigrationStep::RenameColumn { from: "name".into(), to: "full_name".into() }]
//! );
//! ```

use std::collections::HashSet;
use std::fmt;

use ormagic_core::{ModelSchema, add_column_sql, drop_column_sql, rename_column_sql};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, SqliteError};
use crate::executor::Executor;
use crate::store::Store;

/// One schema change applied to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MigrationStep {
    CreateTable { table: String },
    RenameColumn { from: String, to: String },
    DropColumn { column: String },
    AddColumn { column: String },
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table } => write!(f, "create table {table}"),
            Self::RenameColumn { from, to } => write!(f, "rename column {from} to {to}"),
            Self::DropColumn { column } => write!(f, "drop column {column}"),
            Self::AddColumn { column } => write!(f, "add column {column}"),
        }
    }
}

/// Plans the steps that turn `existing` columns into the model's columns.
pub fn plan_migration(existing: &[String], model: &ModelSchema) -> Vec<MigrationStep> {
    let wanted = model.column_names();
    let existing_set: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let wanted_set: HashSet<&str> = wanted.iter().copied().collect();
    if existing_set == wanted_set {
        return Vec::new();
    }

    let removed = existing
        .iter()
        .map(String::as_str)
        .filter(|c| !wanted_set.contains(c));
    let added = wanted.iter().copied().filter(|c| !existing_set.contains(c));

    if existing.len() == wanted.len() {
        return removed
            .zip(added)
            .map(|(from, to)| MigrationStep::RenameColumn {
                from: from.to_string(),
                to: to.to_string(),
            })
            .collect();
    }

    removed
        .map(|column| MigrationStep::DropColumn {
            column: column.to_string(),
        })
        .chain(added.map(|column| MigrationStep::AddColumn {
            column: column.to_string(),
        }))
        .collect()
}

/// State of a model's table compared with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub model: String,
    pub table: String,
    /// Whether the table exists.
    pub exists: bool,
    /// Physical columns, in definition order.
    pub columns: Vec<String>,
    pub rows: u64,
    /// Steps [`Store::update_table`] would apply.
    pub pending: Vec<MigrationStep>,
}

impl MigrationStatus {
    /// Returns `true` if the table matches the model.
    pub fn is_current(&self) -> bool {
        self.exists && self.pending.is_empty()
    }
}

impl<E: Executor + ?Sized> Store<'_, E> {
    /// Creates or alters the model's table to match the model and returns
    /// the applied steps.
    ///
    /// Junction tables of many-to-many fields are ensured on every call.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] for a plan that would drop
    /// the table's primary key, and [`SqliteError::DatabaseError`] when
    /// SQLite rejects a step, such as adding a `NOT NULL` column without a
    /// default to a table that has rows.
    pub fn update_table(&self, model: &str) -> Result<Vec<MigrationStep>> {
        let schema = self.model(model)?;
        let table = schema.table();
        if !self.table_exists(table)? {
            self.create_table(model)?;
            return Ok(vec![MigrationStep::CreateTable {
                table: table.to_string(),
            }]);
        }

        let steps = plan_migration(&self.table_columns(table)?, schema);
        if let Some(pk) = self.table_primary_key(table)? {
            if steps
                .iter()
                .any(|s| matches!(s, MigrationStep::DropColumn { column } if *column == pk))
            {
                return Err(SqliteError::MigrationError(format!(
                    "cannot drop primary key column '{pk}' of table '{table}'"
                )));
            }
        }

        for step in &steps {
            let sql = match step {
                MigrationStep::CreateTable { .. } => continue,
                MigrationStep::RenameColumn { from, to } => rename_column_sql(table, from, to),
                MigrationStep::DropColumn { column } => drop_column_sql(table, column),
                MigrationStep::AddColumn { column } => match schema.field(column) {
                    Some(field) => add_column_sql(schema, field, self.registry())?,
                    None => continue,
                },
            };
            self.execute(&sql, &[])?;
            info!(table, %step, "applied migration step");
        }

        self.ensure_junctions(schema)?;
        Ok(steps)
    }

    /// Reports how the model's table differs from the model without changing it.
    pub fn migration_status(&self, model: &str) -> Result<MigrationStatus> {
        let schema = self.model(model)?;
        let table = schema.table();
        if !self.table_exists(table)? {
            return Ok(MigrationStatus {
                model: schema.name().to_string(),
                table: table.to_string(),
                exists: false,
                columns: Vec::new(),
                rows: 0,
                pending: vec![MigrationStep::CreateTable {
                    table: table.to_string(),
                }],
            });
        }

        let columns = self.table_columns(table)?;
        let pending = plan_migration(&columns, schema);
        let rows = self.scalar(&format!("SELECT COUNT(*) FROM {table}"), &[])?;
        Ok(MigrationStatus {
            model: schema.name().to_string(),
            table: table.to_string(),
            exists: true,
            columns,
            rows: u64::try_from(rows).unwrap_or_default(),
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormagic_core::Field;

    fn user() -> ModelSchema {
        ModelSchema::builder("User")
            .field(Field::text("name"))
            .field(Field::integer("age").nullable())
            .field(Field::reference_list("teams", "Team"))
            .build()
            .unwrap()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_same_columns_in_any_order_is_noop() {
        assert!(plan_migration(&columns(&["id", "name", "age"]), &user()).is_empty());
        assert!(plan_migration(&columns(&["age", "id", "name"]), &user()).is_empty());
    }

    #[test]
    fn test_same_length_pairs_renames_in_order() {
        let plan = plan_migration(&columns(&["id", "first", "years"]), &user());
        assert_eq!(
            plan,
            vec![
                MigrationStep::RenameColumn {
                    from: "first".into(),
                    to: "name".into()
                },
                MigrationStep::RenameColumn {
                    from: "years".into(),
                    to: "age".into()
                },
            ]
        );
    }

    #[test]
    fn test_different_length_drops_then_adds() {
        let plan = plan_migration(&columns(&["id", "name", "email", "phone"]), &user());
        assert_eq!(
            plan,
            vec![
                MigrationStep::DropColumn {
                    column: "email".into()
                },
                MigrationStep::DropColumn {
                    column: "phone".into()
                },
                MigrationStep::AddColumn {
                    column: "age".into()
                },
            ]
        );
    }

    #[test]
    fn test_step_display() {
        let step = MigrationStep::RenameColumn {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(step.to_string(), "rename column a to b");
    }
}
