use thiserror::Error;

/// Errors raised by the storage engine.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file became unreadable, unwritable or disappeared.
    /// There is no way to recover; callers should abort.
    #[error("Database inaccessible: {0}")]
    Inaccessible(String),

    #[error("{kind} has no database")]
    NoDatabase { kind: &'static str },

    #[error("{kind} has no id")]
    NoId { kind: &'static str },

    #[error("No such field: {0}")]
    UnknownField(String),

    #[error("Computed field {0} cannot be deleted")]
    ComputedField(String),

    #[error("Invalid query argument: {0}")]
    InvalidQuery(String),

    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
