//! Connection ownership and transaction scopes.

use ormagic_core::Registry;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::{StoreConfig, StoreOptions};
use crate::error::Result;
use crate::store::Store;

/// An open SQLite database together with the models stored in it.
///
/// # Examples
///
/// ```
/// use ormagic_core::{Field, ModelSchema, Registry};
/// use ormagic_sqlite::{Database, SqliteError};
///
/// let registry = Registry::from_models([ModelSchema::builder("User")
///     .field(Field::text("name"))
///     .build()
///     .unwrap()])
/// .unwrap();
/// let db = Database::open_in_memory(registry).unwrap();
/// db.store().create_table("User").unwrap();
///
/// // Everything inside the closure commits together or not at all.
/// let result: Result<(), SqliteError> = db.transaction(|store| {
///     let mut user = store.record("User")?.with("name", "Ann");
///     store.save(&mut user)?;
///     Err(SqliteError::MigrationError("abort".into()))
/// });
/// assert!(result.is_err());
/// assert!(db.store().all("User").unwrap().is_empty());
/// ```
pub struct Database {
    conn: Connection,
    registry: Registry,
    options: StoreOptions,
}

impl Database {
    /// Opens the database named by the configuration, in memory without a path.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`](crate::SqliteError::DatabaseError) if the
    /// file cannot be opened or a pragma fails.
    pub fn open(config: &StoreConfig, registry: Registry) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => {
                info!(path = %path.display(), "opening database");
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        Self::from_connection(conn, registry, config)
    }

    /// Opens a fresh in-memory database with default settings.
    pub fn open_in_memory(registry: Registry) -> Result<Self> {
        Self::open(&StoreConfig::default(), registry)
    }

    /// Wraps an existing connection, applying the configured pragmas.
    pub fn from_connection(conn: Connection, registry: Registry, config: &StoreConfig) -> Result<Self> {
        let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
        let mode: String = conn.query_row(
            &format!("PRAGMA journal_mode = {}", config.journal_mode.as_sql()),
            [],
            |row| row.get(0),
        )?;
        debug!(foreign_keys, journal_mode = %mode, "connection ready");
        Ok(Self {
            conn,
            registry,
            options: config.options(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// A store whose statements autocommit.
    pub fn store(&self) -> Store<'_> {
        Store::new(&self.conn, &self.registry, self.options)
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`,
    /// handing the error back unchanged.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let store = Store::new(&*tx, &self.registry, self.options);
        match f(&store) {
            Ok(value) => {
                tx.commit()?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "rolling back transaction");
                tx.rollback()?;
                Err(err)
            }
        }
    }
}
