use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`DatabaseDriver`](crate::db::DatabaseDriver).
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// The statement was accepted but describes no result columns.
    #[error("statement does not return rows")]
    NoResultSet,

    #[error("failed scanning row: {0}")]
    Scan(String),

    #[error("failed iterating rows: {0}")]
    Iteration(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection pool is closed")]
    Closed,
}

impl DbError {
    /// True for failures that happen while reading rows of a statement that
    /// already started returning them.
    pub fn is_materialize(&self) -> bool {
        matches!(self, DbError::Scan(_) | DbError::Iteration(_))
    }
}

/// Service level error taxonomy. Every variant maps onto one HTTP status in
/// [`crate::api::ApiError`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid connection parameters: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("no active connection, call POST /connect first")]
    NoActiveConnection,

    #[error("failed to open database connection: {0}")]
    Connection(#[source] DbError),

    #[error("failed to validate database connection: {0}")]
    Validation(#[source] DbError),

    #[error("database ping failed: {0}")]
    HealthCheck(String),

    #[error("failed to close database connection: {0}")]
    Close(#[source] DbError),

    #[error("failed executing query: {0}")]
    Query(#[source] DbError),

    #[error("failed reading row data: {0}")]
    Materialize(#[source] DbError),

    #[error("failed to list {what}: {source}")]
    Catalog {
        what: &'static str,
        #[source]
        source: DbError,
    },
}

impl Error {
    /// Whether the caller caused the failure (bad input, missing connect,
    /// SQL that the database refused).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_)
                | Error::InvalidArgument(_)
                | Error::NoActiveConnection
                | Error::Query(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
