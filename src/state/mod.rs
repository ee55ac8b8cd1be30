use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{with_deadline, Connector, DatabaseDriver};
use crate::error::{Error, Result};
use crate::models::ConnectionConfig;

/// Per-operation deadlines for database round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub ping: Duration,
    pub catalog: Duration,
    pub table_data: Duration,
    pub query: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ping: Duration::from_secs(2),
            catalog: Duration::from_secs(2),
            table_data: Duration::from_secs(5),
            query: Duration::from_secs(15),
        }
    }
}

/// The live driver together with the config that opened it.
pub struct ActiveConnection {
    pub id: Uuid,
    pub driver: Arc<dyn DatabaseDriver>,
    pub config: ConnectionConfig,
    unhealthy: AtomicBool,
}

impl ActiveConnection {
    fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            config,
            unhealthy: AtomicBool::new(false),
        }
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// False once a close attempt on this connection has failed.
    pub fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

/// Owns the single active connection.
///
/// Readers clone the `Arc` under the read lock and do their I/O after
/// releasing it. `connect` and `close` hold the write lock across the whole
/// swap, including closing the handle being replaced, so at most one live
/// pool is ever referenced.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
    active: RwLock<Option<Arc<ActiveConnection>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, timeouts: Timeouts) -> Self {
        Self {
            connector,
            timeouts,
            active: RwLock::new(None),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Opens and pings a new pool, then makes it the active connection.
    ///
    /// On any failure the previous connection is left as it was.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<Arc<ActiveConnection>> {
        config.validate()?;

        let driver = self.connector.open(&config).await.map_err(|e| {
            tracing::warn!(
                database = %config.database,
                host = %config.host,
                error = %e,
                "error opening database"
            );
            Error::Connection(e)
        })?;

        if let Err(e) = with_deadline(self.timeouts.ping, driver.ping()).await {
            tracing::warn!(
                database = %config.database,
                host = %config.host,
                error = %e,
                "error validating database"
            );
            if let Err(close_err) = driver.close().await {
                tracing::warn!(error = %close_err, "failed to close rejected pool");
            }
            return Err(Error::Validation(e));
        }

        let next = Arc::new(ActiveConnection::new(driver, config));

        let mut slot = self.active.write().await;
        // Install first: if this future is dropped mid-close the slot still
        // holds a live connection.
        let previous = slot.replace(Arc::clone(&next));
        if let Some(previous) = previous {
            match previous.driver.close().await {
                Ok(()) => tracing::info!(connection_id = %previous.id, "closed replaced connection"),
                Err(e) => tracing::warn!(
                    connection_id = %previous.id,
                    error = %e,
                    "failed to close replaced connection"
                ),
            }
        }
        drop(slot);

        tracing::info!(
            connection_id = %next.id,
            url = %next.config.redacted_url(),
            "connection to database successful"
        );
        Ok(next)
    }

    /// Pings the active connection.
    pub async fn validate(&self) -> Result<Arc<ActiveConnection>> {
        let current = self.current().await?;

        if !current.is_healthy() {
            return Err(Error::HealthCheck(
                "a previous close attempt failed; retry POST /close or reconnect".into(),
            ));
        }

        with_deadline(self.timeouts.ping, current.driver.ping())
            .await
            .map_err(|e| Error::HealthCheck(e.to_string()))?;

        Ok(current)
    }

    /// Closes the active connection and clears it.
    ///
    /// If the driver reports a close failure the connection stays referenced
    /// but is marked unhealthy.
    pub async fn close(&self) -> Result<Arc<ActiveConnection>> {
        let mut slot = self.active.write().await;
        let current = slot.clone().ok_or(Error::NoActiveConnection)?;

        if let Err(e) = current.driver.close().await {
            current.unhealthy.store(true, Ordering::Release);
            tracing::warn!(connection_id = %current.id, error = %e, "failed to close connection");
            return Err(Error::Close(e));
        }

        *slot = None;
        tracing::info!(
            connection_id = %current.id,
            database = %current.database(),
            "database connection closed"
        );
        Ok(current)
    }

    /// The active connection, if any. Never waits on database I/O.
    pub async fn current(&self) -> Result<Arc<ActiveConnection>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(Error::NoActiveConnection)
    }

    /// Closes whatever is active. Used on process shutdown.
    pub async fn shutdown(&self) {
        let mut slot = self.active.write().await;
        if let Some(current) = slot.take() {
            if let Err(e) = current.driver.close().await {
                tracing::warn!(connection_id = %current.id, error = %e, "failed to close connection on shutdown");
            } else {
                tracing::info!(connection_id = %current.id, "closed connection on shutdown");
            }
        }
    }
}

/// Application state shared across all request handlers.
pub struct AppState {
    pub connections: ConnectionManager,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, timeouts: Timeouts) -> Self {
        Self {
            connections: ConnectionManager::new(connector, timeouts),
        }
    }
}
