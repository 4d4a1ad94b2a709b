use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// An insert collided with an existing row holding the same key.
    #[error("conflict in {table}: {message}")]
    Conflict { table: String, message: String },

    #[error("{store} store unreachable: {message}")]
    Connectivity { store: &'static str, message: String },

    #[error("table {0} does not exist")]
    MissingTable(String),

    #[error("invalid value for {column}: {value}")]
    InvalidValue { column: String, value: String },
}

impl StoreError {
    pub fn conflict(table: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_value(column: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.to_string(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Errors that abort a whole sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A store failed its pre-flight check.
    #[error("connectivity check failed: {0}")]
    Connectivity(StoreError),

    /// Schema introspection failed.
    #[error("schema probe failed for {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: StoreError,
    },

    /// Another run holds the sync lock.
    #[error("another sync run is already in progress")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
