//! Field value model and type descriptors for the tunedb storage engine.
//!
//! A [`Type`] describes how one field's values are normalized, parsed from
//! user-entered text, formatted for display, and converted to and from the
//! SQLite value representation. This crate has no knowledge of tables or
//! connections; `tunedb-db` consumes these types when it maps rows onto
//! models.

pub mod musical_key;
pub mod path;
pub mod time;
pub mod types;
pub mod value;

pub use musical_key::MusicalKey;
pub use path::PathType;
pub use time::{DateType, DurationType, DEFAULT_TIME_FORMAT};
pub use types::{
    Affinity, Boolean, DefaultType, DelimitedString, Float, Id, Integer, PaddedInt, QueryKind,
    ScaledInt, StringType, Type, BOOLEAN, DEFAULT, FLOAT, FOREIGN_ID, INTEGER, MULTI_VALUE_DELIMITER,
    MULTI_VALUE_DSV, NULL_FLOAT, PRIMARY_ID, SEMICOLON_SPACE_DELIMITER, SEMICOLON_SPACE_DSV,
    STRING,
};
pub use value::{SqlValue, Value};
