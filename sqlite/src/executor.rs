//! Statement execution seam.
//!
//! Every statement the store issues goes through an [`Executor`]. The
//! implementation for [`rusqlite::Connection`] also serves transactions,
//! which dereference to a connection.

use std::sync::Arc;

use ormagic_core::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::convert;
use crate::error::Result;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Executed {
    pub rows_affected: usize,
    /// Rowid of the most recent successful insert on the connection.
    pub last_insert_id: i64,
}

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Column/value pairs in select order.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        let columns = self.columns;
        self.values
            .into_iter()
            .enumerate()
            .map(move |(i, value)| (columns[i].clone(), value))
    }
}

/// Runs parameterized SQL.
pub trait Executor {
    /// Executes a statement that returns no rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Executed>;

    /// Runs a query and collects every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

impl Executor for Connection {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Executed> {
        debug!(sql, params = params.len(), "execute");
        let mut stmt = self.prepare(sql)?;
        let rows_affected = stmt.execute(params_from_iter(convert::to_sql_params(params)?))?;
        Ok(Executed {
            rows_affected,
            last_insert_id: self.last_insert_rowid(),
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(sql, params = params.len(), "query");
        let mut stmt = self.prepare(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt.query(params_from_iter(convert::to_sql_params(params)?))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(convert::from_sql(row.get_ref(i)?)?);
            }
            result.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_executor() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", ())
            .unwrap();

        let done =
            Executor::execute(&conn, "INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
                .unwrap();
        assert_eq!(done.rows_affected, 1);
        assert_eq!(done.last_insert_id, 1);

        let rows = conn
            .query("SELECT id, name FROM t WHERE name = ?", &[Value::from("a")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), ["id", "name"]);
        assert_eq!(rows[0].get("name"), Some(&Value::from("a")));

        let pairs: Vec<_> = rows[0].clone().into_pairs().collect();
        assert_eq!(pairs[0], ("id".to_string(), Value::Integer(1)));
    }
}
