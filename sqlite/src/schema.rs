//! Table lifecycle: create, drop and inspect model tables.
//!
//! Each model maps to one table named after the model. Many-to-many fields
//! map to junction tables named `<a>_<b>` with one `<table>_id` column per
//! side; an existing junction is found under either ordering, so both models
//! of a relation share it.

use ormagic_core::{
    ModelSchema, Value, create_junction_sql, create_table_sql, drop_table_sql, junction_table_name,
};
use tracing::info;

use crate::error::Result;
use crate::executor::Executor;
use crate::store::Store;

impl<E: Executor + ?Sized> Store<'_, E> {
    /// Creates the model's table and its junction tables if missing.
    pub fn create_table(&self, model: &str) -> Result<()> {
        let schema = self.model(model)?;
        let sql = create_table_sql(schema, self.registry())?;
        self.execute(&sql, &[])?;
        info!(table = schema.table(), "created table");
        self.ensure_junctions(schema)
    }

    /// Drops the model's table if it exists.
    pub fn drop_table(&self, model: &str) -> Result<()> {
        let schema = self.model(model)?;
        self.execute(&drop_table_sql(schema.table()), &[])?;
        info!(table = schema.table(), "dropped table");
        Ok(())
    }

    /// Returns `true` if a table with this exact name exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count = self.scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            &[Value::from(table)],
        )?;
        Ok(count > 0)
    }

    /// Physical column names of a table in definition order, empty if it does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self.query(
            "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
            &[Value::from(table)],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.values().first().and_then(|v| v.as_str()).map(String::from))
            .collect())
    }

    /// Physical primary-key column of a table, if it declares one.
    pub(crate) fn table_primary_key(&self, table: &str) -> Result<Option<String>> {
        let rows = self.query(
            "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
            &[Value::from(table)],
        )?;
        Ok(rows
            .first()
            .and_then(|row| row.values().first())
            .and_then(|v| v.as_str())
            .map(String::from))
    }

    /// Name of the existing junction table between two models, trying both orderings.
    pub fn junction_table(&self, a: &ModelSchema, b: &ModelSchema) -> Result<Option<String>> {
        for name in [junction_table_name(a, b), junction_table_name(b, a)] {
            if self.table_exists(&name)? {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    /// Returns the junction table between two models, creating `<a>_<b>` if neither ordering exists.
    pub fn ensure_junction(&self, a: &ModelSchema, b: &ModelSchema) -> Result<String> {
        if let Some(name) = self.junction_table(a, b)? {
            return Ok(name);
        }
        self.execute(&create_junction_sql(a, b), &[])?;
        let name = junction_table_name(a, b);
        info!(table = %name, "created junction table");
        Ok(name)
    }

    pub(crate) fn ensure_junctions(&self, schema: &ModelSchema) -> Result<()> {
        for field in schema.reference_lists() {
            if let Some(target) = field.field_type.target() {
                let target = self.model(target)?;
                self.ensure_junction(schema, target)?;
            }
        }
        Ok(())
    }
}
