//! SQLite-backed entity storage with fixed and flexible fields.
//!
//! A kind declares its typed fixed columns once (see [`Kind`]); any other
//! field name is stored as a flexible attribute in a companion key/value
//! table. Models track which fields are dirty, transactions nest per
//! thread behind one process-wide write lock, and fetches compile a query
//! and sort into a single statement.

pub mod config;
pub mod database;
pub mod error;
pub mod functions;
pub mod kind;
mod lock;
pub mod model;
pub mod query;
pub mod results;
mod schema;
pub mod sort;
pub mod sql;
pub mod transaction;

pub use config::{default_library_path, DbConfig};
pub use database::{Database, DatabaseBuilder, DEFAULT_TIMEOUT, MAX_TIMEOUT};
pub use error::{DbError, Result};
pub use kind::{Field, FieldRegistry, FieldRegistryBuilder, Kind, Relation, TableSpec, ID_FIELD};
pub use model::{Model, ADDED_FIELD};
pub use query::{
    any_field_query, field_query, AndQuery, BooleanQuery, FalseQuery, MatchQuery, NoneQuery,
    NotQuery, NumericQuery, OrQuery, PathQuery, Query, RegexpQuery, SubstringQuery, TrueQuery,
};
pub use results::Results;
pub use sort::{sort_for_field, FieldLookup, FixedFieldSort, MultipleSort, SlowFieldSort, Sort};
pub use sql::SqlScope;
pub use transaction::{Row, Transaction};
pub use tunedb_types;
