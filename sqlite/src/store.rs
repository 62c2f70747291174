//! Record persistence: save, load, filter and delete.
//!
//! A [`Store`] borrows an [`Executor`] and the model [`Registry`]. Outside a
//! transaction every statement autocommits; inside
//! [`Database::transaction`](crate::Database::transaction) the store is bound
//! to the open transaction.
//!
//! # Example
//!
//! ```
//! use ormagic_core::{Field, ModelSchema, Query, Q, Registry};
//! use ormagic_sqlite::Database;
//!
//! let registry = Registry::from_models([ModelSchema::builder("User")
//!     .field(Field::text("name"))
//!     .field(Field::integer("age"))
//!     .build()
//!     .unwrap()])
//! .unwrap();
//! let db = Database::open_in_memory(registry).unwrap();
//! let store = db.store();
//! store.create_table("User").unwrap();
//!
//! let mut john = store.record("User").unwrap().with("name", "John").with("age", 30);
//! store.save(&mut john).unwrap();
//! assert!(john.pk().is_some());
//!
//! let found = store.get("User", &Query::new().filter(Q::eq("name", "John"))).unwrap();
//! assert_eq!(found.value("age").as_i64(), Some(30));
//! ```

use std::sync::Arc;

use ormagic_core::{FieldType, ModelSchema, Query, Record, Registry, Value};
use rusqlite::Connection;
use tracing::debug;

use crate::config::StoreOptions;
use crate::error::{Result, SqliteError};
use crate::executor::{Executed, Executor, Row};
use crate::relations::Depth;

/// Persistence operations over one executor.
pub struct Store<'a, E: Executor + ?Sized = Connection> {
    exec: &'a E,
    registry: &'a Registry,
    options: StoreOptions,
}

impl<'a, E: Executor + ?Sized> Store<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, options: StoreOptions) -> Self {
        Self {
            exec,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Looks up a registered model.
    pub fn model(&self, name: &str) -> Result<&'a Arc<ModelSchema>> {
        Ok(self.registry.get(name)?)
    }

    /// A new transient record of the named model, defaults applied.
    pub fn record(&self, model: &str) -> Result<Record> {
        Ok(Record::new(Arc::clone(self.model(model)?)))
    }

    /// Inserts or updates a record, then syncs its many-to-many relations.
    ///
    /// A record whose primary key matches an existing row is updated;
    /// otherwise a row is inserted and an integer key assigned by SQLite is
    /// written back into the record. Unsaved records referenced by the
    /// record are saved first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ConversionError`] when a text primary key is
    /// unset or a reference holds a record of the wrong model, and
    /// [`SqliteError::DatabaseError`] for constraint violations.
    pub fn save(&self, record: &mut Record) -> Result<()> {
        let schema = Arc::clone(record.schema());
        let pk_field = schema.primary_key();
        if record.pk().is_none() && pk_field.field_type != FieldType::Integer {
            return Err(SqliteError::ConversionError(format!(
                "{} requires a value for primary key '{}'",
                schema.name(),
                pk_field.name
            )));
        }

        let columns = self.column_values(record)?;
        let existing = match record.pk() {
            Some(pk) => self.exists(&schema, pk)?.then(|| pk.clone()),
            None => None,
        };

        let inserted = match existing {
            Some(pk) => {
                self.update_row(&schema, columns, pk)?;
                false
            }
            None => {
                let id = self.insert_row(&schema, columns, record.pk().cloned())?;
                if record.pk().is_none() {
                    record.set_pk(id);
                }
                true
            }
        };

        self.sync_many_to_many(record, inserted)
    }

    fn exists(&self, schema: &ModelSchema, pk: &Value) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            schema.table(),
            schema.primary_key().name
        );
        Ok(self.scalar(&sql, std::slice::from_ref(pk))? > 0)
    }

    fn update_row(&self, schema: &ModelSchema, columns: Vec<(String, Value)>, pk: Value) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns.iter().map(|(name, _)| format!("{name} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            schema.table(),
            assignments.join(", "),
            schema.primary_key().name
        );
        let mut params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        params.push(pk.clone());

        if self.execute(&sql, &params)?.rows_affected == 0 {
            return Err(SqliteError::not_found(schema.name(), pk.to_string()));
        }
        debug!(model = schema.name(), pk = %pk, "updated");
        Ok(())
    }

    fn insert_row(
        &self,
        schema: &ModelSchema,
        mut columns: Vec<(String, Value)>,
        pk: Option<Value>,
    ) -> Result<i64> {
        if let Some(pk) = pk {
            columns.insert(0, (schema.primary_key().name.clone(), pk));
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", schema.table())
        } else {
            let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                schema.table(),
                names.join(", ")
            )
        };
        let params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        let Executed { last_insert_id, .. } = self.execute(&sql, &params)?;
        debug!(model = schema.name(), rowid = last_insert_id, "inserted");
        Ok(last_insert_id)
    }

    /// Returns the first record matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NotFound`] when nothing matches, and
    /// [`SqliteError::Schema`] for an invalid filter.
    pub fn get(&self, model: &str, query: &Query) -> Result<Record> {
        let schema = self.model(model)?;
        let query = match query.limit_value() {
            Some(_) => query.clone(),
            None => query.clone().limit(1),
        };
        let (sql, params) = query.select_sql(schema, self.options.strict_filters)?;
        let row = self.exec.query(&sql, &params)?.into_iter().next().ok_or_else(|| {
            let key = match query.predicate(schema, false) {
                Ok(Some(predicate)) => predicate.clause,
                _ => "any row".to_string(),
            };
            SqliteError::not_found(schema.name(), key)
        })?;
        self.hydrate(schema, row, Depth::default())
    }

    /// Returns every record matching the query, in the query's order.
    pub fn filter(&self, model: &str, query: &Query) -> Result<Vec<Record>> {
        let schema = self.model(model)?;
        let (sql, params) = query.select_sql(schema, self.options.strict_filters)?;
        self.exec
            .query(&sql, &params)?
            .into_iter()
            .map(|row| self.hydrate(schema, row, Depth::default()))
            .collect()
    }

    /// Returns every record of a model.
    pub fn all(&self, model: &str) -> Result<Vec<Record>> {
        self.filter(model, &Query::new())
    }

    /// Counts the records matching the query's filter.
    pub fn count(&self, model: &str, query: &Query) -> Result<u64> {
        let schema = self.model(model)?;
        let (sql, params) = query.count_sql(schema, self.options.strict_filters)?;
        let count = self.scalar(&sql, &params)?;
        u64::try_from(count)
            .map_err(|_| SqliteError::ConversionError(format!("negative row count: {count}")))
    }

    /// Deletes a saved record by primary key.
    ///
    /// Rows that reference it are handled by their `on_delete` action;
    /// junction rows cascade.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NotFound`] when the record was never saved or
    /// its row is already gone, and [`SqliteError::DatabaseError`] when a
    /// `RESTRICT` reference blocks the delete.
    pub fn delete(&self, record: &Record) -> Result<()> {
        let schema = record.schema();
        let pk = record
            .pk()
            .ok_or_else(|| SqliteError::not_found(schema.name(), "unsaved record"))?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            schema.table(),
            schema.primary_key().name
        );
        if self.execute(&sql, std::slice::from_ref(pk))?.rows_affected == 0 {
            return Err(SqliteError::not_found(schema.name(), pk.to_string()));
        }
        debug!(model = schema.name(), pk = %pk, "deleted");
        Ok(())
    }

    pub(crate) fn execute(&self, sql: &str, params: &[Value]) -> Result<Executed> {
        self.exec.execute(sql, params)
    }

    pub(crate) fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.exec.query(sql, params)
    }

    /// First column of the first row as an integer.
    pub(crate) fn scalar(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.query(sql, params)?
            .first()
            .and_then(|row| row.values().first())
            .and_then(Value::as_i64)
            .ok_or_else(|| SqliteError::ConversionError(format!("expected an integer from: {sql}")))
    }
}
