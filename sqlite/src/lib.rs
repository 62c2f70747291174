//! SQLite persistence engine for ormagic models.
//!
//! This crate maps the models of an [`ormagic_core::Registry`] onto SQLite
//! tables and moves [`Record`](ormagic_core::Record)s in and out of them.
//!
//! # Architecture
//!
//! - **`database`**: owns the connection, applies pragmas, opens transactions
//! - **`store`**: save, get, filter, all, count and delete
//! - **`relations`**: foreign-key resolution and many-to-many junction rows
//! - **`schema`**: table creation, inspection and junction tables
//! - **`migration`**: diffing tables against models and applying the plan
//! - **`executor`**: the statement seam, implemented for `rusqlite::Connection`
//! - **`config`**: YAML-backed connection and engine settings
//!
//! # Quick start
//!
//! ```
//! use ormagic_core::{Field, ModelSchema, Query, Registry};
//! use ormagic_sqlite::Database;
//!
//! let registry = Registry::from_models([
//!     ModelSchema::builder("Team")
//!         .field(Field::text("name"))
//!         .build()
//!         .unwrap(),
//!     ModelSchema::builder("User")
//!         .field(Field::text("name"))
//!         .field(Field::reference_list("teams", "Team"))
//!         .build()
//!         .unwrap(),
//! ])
//! .unwrap();
//!
//! let db = Database::open_in_memory(registry).unwrap();
//! let store = db.store();
//! store.update_table("Team").unwrap();
//! store.update_table("User").unwrap();
//!
//! let team = store.record("Team").unwrap().with("name", "core");
//! let mut ann = store.record("User").unwrap().with("name", "Ann").with("teams", vec![team]);
//! store.save(&mut ann).unwrap();
//!
//! let loaded = store.get("User", &Query::new().lookup("name", "Ann").unwrap()).unwrap();
//! assert_eq!(loaded.related_list("teams").len(), 1);
//! ```
//!
//! # Transactions
//!
//! [`Database::transaction`] hands a closure a [`Store`] bound to an open
//! transaction. The transaction commits when the closure returns `Ok` and
//! rolls back when it returns `Err`.

mod config;
mod convert;
mod database;
mod error;
mod executor;
mod migration;
mod relations;
mod schema;
mod store;

pub use config::{JournalMode, StoreConfig, StoreOptions};
pub use database::Database;
pub use error::{Result, SqliteError};
pub use executor::{Executed, Executor, Row};
pub use migration::{MigrationStatus, MigrationStep, plan_migration};
pub use relations::Depth;
pub use store::Store;
