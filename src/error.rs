use deadpool_sqlite::rusqlite;
use thiserror::Error;

/// Errors surfaced by query execution, transaction coordination, and the
/// connection pool facade.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A parameter batch did not line up with the statement's placeholder count.
    /// Raised before any database call is attempted.
    #[error("binding count mismatch: expected {expected} parameter(s), got {actual}")]
    BindingCount { expected: usize, actual: usize },

    /// A bound value cannot be mapped to a native column type.
    #[error("unsupported parameter type: {0}")]
    UnsupportedParameterType(String),

    /// Positional binding failed (duplicate, missing, or out-of-range position).
    #[error("parameter binding error: {0}")]
    Parameter(String),

    /// The database rejected the statement. `code` carries the native extended
    /// error code when one is available.
    #[error("database rejected statement: {message}")]
    Database { code: Option<i32>, message: String },

    /// Checking out a pooled connection timed out.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// An upstream dependency failed; execution never started.
    #[error("dependency failed: {0}")]
    DependencyFailure(String),

    /// The physical commit or rollback call itself failed.
    #[error("transaction finalization failed: {0}")]
    TransactionFinalization(String),

    /// Transaction coordinator misuse, e.g. finalizing with members in flight
    /// or registering a statement after finalization.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Worker/channel plumbing failure around a native connection.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // The driver caught a bind/placeholder mismatch that the local
            // check could not (caller-supplied placeholder count was wrong).
            rusqlite::Error::InvalidParameterCount(given, expected) => RelayError::BindingCount {
                expected,
                actual: given,
            },
            rusqlite::Error::SqliteFailure(native, message) => RelayError::Database {
                code: Some(native.extended_code),
                message: message.unwrap_or_else(|| native.to_string()),
            },
            other => RelayError::Database {
                code: None,
                message: other.to_string(),
            },
        }
    }
}
