use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{ColumnDefinition, ConnectionConfig, IndexDefinition, QueryResult};

pub mod materialize;
pub mod postgres;
pub mod quote;

pub use quote::QualifiedTable;

/// Operations the browser needs from one open pool.
///
/// Implementations do not apply deadlines themselves; callers wrap every call
/// in a timeout.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;

    /// Runs `sql` as a row-returning statement. Statements that describe no
    /// result columns fail with [`DbError::NoResultSet`].
    async fn query(&self, sql: &str) -> Result<QueryResult, DbError>;

    /// Runs `sql` without reading rows and returns the affected-row count.
    async fn execute(&self, sql: &str) -> Result<u64, DbError>;

    async fn get_schemas(&self) -> Result<Vec<String>, DbError>;
    async fn get_tables(&self, schema: &str) -> Result<Vec<String>, DbError>;
    async fn get_views(&self, schema: &str) -> Result<Vec<String>, DbError>;
    async fn get_indexes(&self, schema: &str) -> Result<Vec<IndexDefinition>, DbError>;
    async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDefinition>, DbError>;
    async fn get_table_data(&self, table: &QualifiedTable) -> Result<QueryResult, DbError>;

    async fn close(&self) -> Result<(), DbError>;
}

/// Opens a [`DatabaseDriver`] for a validated config.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseDriver>, DbError>;
}

/// Runs `fut` with a relative deadline. Dropping the returned future (for
/// example when the HTTP request goes away) drops the database call with it.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DbError::Timeout(limit))?
}
