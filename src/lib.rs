//! pgweb: a PostgreSQL browser served over HTTP.
//!
//! One connection pool is active at a time. Clients connect with runtime
//! credentials, then browse schemas, tables, views, indexes and columns, read
//! table data, or run ad-hoc SQL. Every result comes back as JSON.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod query;
pub mod schema;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::postgres::PostgresConnector;
use state::AppState;

/// Request headers the bundled htmx frontend sends cross-origin.
const HTMX_HEADERS: [&str; 4] = ["hx-request", "hx-trigger", "hx-target", "hx-current-url"];

/// Builds the application router with middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let mut allowed_headers = vec![header::CONTENT_TYPE, header::ACCEPT];
    allowed_headers.extend(HTMX_HEADERS.into_iter().map(HeaderName::from_static));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(allowed_headers);

    api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Binds the configured address and serves until `shutdown` resolves, then
/// closes the active database connection.
pub async fn serve<F>(config: &Config, shutdown: F) -> Result<(), ServeError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let connector = PostgresConnector::new(
        config.database.max_connections,
        config.database.acquire_timeout(),
    );
    let state = Arc::new(AppState::new(
        Arc::new(connector),
        config.database.timeouts(),
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;

    tracing::info!(%addr, "REST API listening");

    let result = axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServeError::Serve);

    state.connections.shutdown().await;
    result
}
