//! Model descriptors and SQL generation for the ormagic persistence engine.
//!
//! This crate holds everything that does not need a database connection:
//!
//! - [`ModelSchema`] and [`Field`] describe a model's fields, its primary key
//!   and its relations. Models are collected in a [`Registry`].
//! - [`Record`] is a dynamic instance of a model, holding [`Value`]s.
//! - [`Q`] composes filter conditions with `&`, `|` and `!`, and compiles
//!   them into parameterized WHERE clauses ([`Predicate`]).
//! - [`Query`] adds ordering and paging on top of a filter.
//! - The DDL functions ([`create_table_sql`], [`add_column_sql`], ...)
//!   translate descriptors into SQLite statements.
//!
//! Validation ([`validate_model`], [`validate_registry`]) rejects model
//! declarations that cannot be mapped onto tables, such as duplicate fields,
//! ambiguous primary keys or names that are not plain identifiers.
//!
//! # Example
//!
//! ```
//! use ormagic_core::*;
//!
//! let registry = Registry::from_models([
//!     ModelSchema::builder("User")
//!         .field(Field::text("name").unique())
//!         .field(Field::integer("age").default(18))
//!         .build()
//!         .unwrap(),
//!     ModelSchema::builder("Post")
//!         .field(Field::text("title"))
//!         .field(Field::reference("author", "User"))
//!         .build()
//!         .unwrap(),
//! ])
//! .unwrap();
//!
//! let post = registry.get("Post").unwrap();
//! assert_eq!(
//!     create_table_sql(post, &registry).unwrap(),
//!     "CREATE TABLE IF NOT EXISTS post (id INTEGER PRIMARY KEY, title TEXT NOT NULL, \
//!      author INTEGER NOT NULL, FOREIGN KEY (author) REFERENCES user(id) \
//!      ON UPDATE CASCADE ON DELETE CASCADE)"
//! );
//!
//! let filter = Q::eq("name", "John") | Q::gt("age", 30);
//! let predicate = filter.compile(registry.get("User").unwrap(), true).unwrap();
//! assert_eq!(predicate.clause, "(name = ? OR age > ?)");
//! ```

mod ddl;
mod error;
mod filter;
mod model;
mod query;
mod record;
mod validate;
mod value;

pub use ddl::{
    SqlType, add_column_sql, column_definition, create_junction_sql, create_table_sql,
    drop_column_sql, drop_table_sql, foreign_key_clause, junction_column, junction_table_name,
    rename_column_sql, sql_type,
};
pub use error::{Result, SchemaError};
pub use filter::{Condition, FilterValue, LOOKUP_SEPARATOR, Operator, Predicate, Q, split_lookup};
pub use model::{Field, FieldType, ModelBuilder, ModelSchema, OnDelete, Registry};
pub use query::{OrderBy, Query, RESERVED_KEYS};
pub use record::Record;
pub use validate::{ValidationError, validate_model, validate_registry};
pub use value::{Literal, Value};
