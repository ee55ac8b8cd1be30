//! HTTP handlers for the browser API.

mod error;

pub use error::ApiError;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{ColumnDefinition, ConnectionConfig, IndexDefinition, RowMap};
use crate::query::{self, ExecOutcome};
use crate::schema;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchemasResponse {
    pub schemas: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    pub schema: String,
    pub tables: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewsResponse {
    pub schema: String,
    pub views: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexesResponse {
    pub schema: String,
    pub indexes: Vec<IndexDefinition>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnsResponse {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Serialize)]
pub struct TableDataResponse {
    pub schema: String,
    pub table: String,
    pub rows: Vec<RowMap>,
}

/// Routes of the browser API, without middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/connect", post(connect_handler))
        .route("/validate", get(validate_handler))
        .route("/close", post(close_handler))
        .route("/query", post(query_handler))
        .route("/schemas", get(schemas_handler))
        .route("/schemas/{schema}/tables", get(tables_handler))
        .route("/schemas/{schema}/tables/{table}/columns", get(columns_handler))
        .route("/schemas/{schema}/tables/{table}/data", get(table_data_handler))
        .route("/schemas/{schema}/views", get(views_handler))
        .route("/schemas/{schema}/indexes", get(indexes_handler))
        .layer(Extension(state))
}

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(format!("Failed to decode request body: {}", e.body_text())))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `POST /connect`.
pub async fn connect_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ConnectionConfig>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let config = decode(payload)?;
    let active = state.connections.connect(config).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!(
                "Successful connection to the database {} achieved!",
                active.database()
            ),
        }),
    ))
}

/// Handler for `GET /validate`.
pub async fn validate_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let active = state.connections.validate().await?;
    Ok(Json(MessageResponse {
        message: format!("Database {} connection is healthy", active.database()),
    }))
}

/// Handler for `POST /close`.
pub async fn close_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.connections.close().await?;
    Ok(Json(MessageResponse {
        message: "Database connection closed successfully".into(),
    }))
}

/// Handler for `POST /query`.
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ExecOutcome>, ApiError> {
    let request = decode(payload)?;
    let outcome = query::execute(&state.connections, &request.query).await?;
    Ok(Json(outcome))
}

/// Handler for `GET /schemas`.
pub async fn schemas_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<SchemasResponse>, ApiError> {
    let schemas = schema::list_schemas(&state.connections).await?;
    Ok(Json(SchemasResponse {
        count: schemas.len(),
        schemas,
    }))
}

/// Handler for `GET /schemas/{schema}/tables`.
pub async fn tables_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema_name): Path<String>,
) -> Result<Json<TablesResponse>, ApiError> {
    let tables = schema::list_tables(&state.connections, &schema_name).await?;
    Ok(Json(TablesResponse {
        schema: schema_name,
        count: tables.len(),
        tables,
    }))
}

/// Handler for `GET /schemas/{schema}/views`.
pub async fn views_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema_name): Path<String>,
) -> Result<Json<ViewsResponse>, ApiError> {
    let views = schema::list_views(&state.connections, &schema_name).await?;
    Ok(Json(ViewsResponse {
        schema: schema_name,
        count: views.len(),
        views,
    }))
}

/// Handler for `GET /schemas/{schema}/indexes`.
pub async fn indexes_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema_name): Path<String>,
) -> Result<Json<IndexesResponse>, ApiError> {
    let indexes = schema::list_indexes(&state.connections, &schema_name).await?;
    Ok(Json(IndexesResponse {
        schema: schema_name,
        count: indexes.len(),
        indexes,
    }))
}

/// Handler for `GET /schemas/{schema}/tables/{table}/columns`.
pub async fn columns_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((schema_name, table)): Path<(String, String)>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    let columns = schema::list_columns(&state.connections, &schema_name, &table).await?;
    Ok(Json(ColumnsResponse {
        schema: schema_name,
        table,
        columns,
    }))
}

/// Handler for `GET /schemas/{schema}/tables/{table}/data`.
pub async fn table_data_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((schema_name, table)): Path<(String, String)>,
) -> Result<Json<TableDataResponse>, ApiError> {
    let data = schema::list_table_data(&state.connections, &schema_name, &table).await?;
    Ok(Json(TableDataResponse {
        schema: schema_name,
        table,
        rows: data.rows,
    }))
}
