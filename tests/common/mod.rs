#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use pgweb::db::{Connector, DatabaseDriver, QualifiedTable};
use pgweb::error::DbError;
use pgweb::models::{CellValue, ColumnDefinition, ConnectionConfig, IndexDefinition, QueryResult};
use pgweb::state::{AppState, Timeouts};

/// Host names that make [`FakeConnector`] misbehave.
pub const UNREACHABLE_HOST: &str = "unreachable";
pub const BAD_PING_HOST: &str = "noping";
pub const SLOW_PING_HOST: &str = "slow";

fn protocol(msg: &str) -> DbError {
    DbError::Sqlx(sqlx::Error::Protocol(msg.to_string()))
}

/// In-memory stand-in for one Postgres pool.
pub struct FakeDriver {
    pub host: String,
    pub database: String,
    closed: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicUsize,
    last_table: Mutex<Option<QualifiedTable>>,
}

impl FakeDriver {
    fn new(config: &ConnectionConfig, fail_close: bool) -> Self {
        Self {
            host: config.host.clone(),
            database: config.database.clone(),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(fail_close),
            close_calls: AtomicUsize::new(0),
            last_table: Mutex::new(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// The relation the last table-data read was issued for.
    pub fn last_table(&self) -> Option<QualifiedTable> {
        self.last_table.lock().unwrap().clone()
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(())
    }
}

fn row(pairs: &[(&str, CellValue)]) -> BTreeMap<String, CellValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[async_trait]
impl DatabaseDriver for FakeDriver {
    async fn ping(&self) -> Result<(), DbError> {
        self.ensure_open()?;
        match self.host.as_str() {
            BAD_PING_HOST => Err(protocol("password authentication failed")),
            SLOW_PING_HOST => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn query(&self, sql: &str) -> Result<QueryResult, DbError> {
        self.ensure_open()?;
        let upper = sql.trim().to_ascii_uppercase();
        if upper == "SELECT 1" {
            return Ok(QueryResult {
                columns: vec!["?column?".into()],
                rows: vec![row(&[("?column?", CellValue::Int(1))])],
            });
        }
        if upper.starts_with("SELECT NAME") {
            return Ok(QueryResult {
                columns: vec!["name".into(), "score".into()],
                rows: vec![
                    row(&[("name", CellValue::Text("ada".into())), ("score", CellValue::Float(9.5))]),
                    row(&[("name", CellValue::Text("bob".into())), ("score", CellValue::Null)]),
                ],
            });
        }
        if upper.starts_with("SELECT BROKEN") {
            return Err(DbError::Scan("column 0: unsupported type".into()));
        }
        if upper.starts_with("SELECT PG_SLEEP") {
            return std::future::pending().await;
        }
        if upper.starts_with("UPDATE") || upper.starts_with("CREATE") || upper.starts_with("DELETE") {
            return Err(DbError::NoResultSet);
        }
        Err(protocol(&format!("syntax error at or near \"{}\"", sql.trim())))
    }

    async fn execute(&self, sql: &str) -> Result<u64, DbError> {
        self.ensure_open()?;
        let upper = sql.trim().to_ascii_uppercase();
        if upper.starts_with("UPDATE") {
            return Ok(3);
        }
        if upper.starts_with("CREATE") || upper.starts_with("DELETE") {
            return Ok(0);
        }
        Err(protocol(&format!("syntax error at or near \"{}\"", sql.trim())))
    }

    async fn get_schemas(&self) -> Result<Vec<String>, DbError> {
        self.ensure_open()?;
        Ok(["public", "pg_catalog", "information_schema", "app", "pg_toast"]
            .into_iter()
            .map(String::from)
            .collect())
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>, DbError> {
        self.ensure_open()?;
        Ok(match schema {
            "public" => vec!["orders".into(), "users".into()],
            _ => Vec::new(),
        })
    }

    async fn get_views(&self, schema: &str) -> Result<Vec<String>, DbError> {
        self.ensure_open()?;
        Ok(match schema {
            "public" => vec!["active_users".into()],
            _ => Vec::new(),
        })
    }

    async fn get_indexes(&self, schema: &str) -> Result<Vec<IndexDefinition>, DbError> {
        self.ensure_open()?;
        Ok(match schema {
            "public" => vec![
                IndexDefinition {
                    index: "orders_pkey".into(),
                    table: "orders".into(),
                },
                IndexDefinition {
                    index: "users_pkey".into(),
                    table: "users".into(),
                },
            ],
            _ => Vec::new(),
        })
    }

    async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDefinition>, DbError> {
        self.ensure_open()?;
        if (schema, table) != ("public", "users") {
            return Ok(Vec::new());
        }
        Ok(vec![
            ColumnDefinition {
                name: "id".into(),
                data_type: "integer".into(),
                constraints: vec!["PRIMARY KEY".into()],
            },
            ColumnDefinition {
                name: "email".into(),
                data_type: "text".into(),
                constraints: vec!["UNIQUE".into()],
            },
            ColumnDefinition {
                name: "nickname".into(),
                data_type: "character varying".into(),
                constraints: Vec::new(),
            },
        ])
    }

    async fn get_table_data(&self, table: &QualifiedTable) -> Result<QueryResult, DbError> {
        self.ensure_open()?;
        *self.last_table.lock().unwrap() = Some(table.clone());
        match table.table() {
            "users" => Ok(QueryResult {
                columns: vec!["id".into(), "email".into()],
                rows: vec![row(&[
                    ("id", CellValue::Int(1)),
                    ("email", CellValue::Text("ada@example.com".into())),
                ])],
            }),
            "corrupt" => Err(DbError::Iteration("unexpected EOF".into())),
            "empty" => Ok(QueryResult::default()),
            other => Err(protocol(&format!("relation \"{other}\" does not exist"))),
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(protocol("close failed"));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens [`FakeDriver`]s and remembers every one it handed out.
#[derive(Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<Arc<FakeDriver>>>,
    fail_close: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// New drivers will report a failure from `close`.
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<Arc<FakeDriver>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last_opened(&self) -> Arc<FakeDriver> {
        self.opened().last().cloned().expect("no driver opened")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseDriver>, DbError> {
        if config.host == UNREACHABLE_HOST {
            return Err(protocol("connection refused"));
        }
        let driver = Arc::new(FakeDriver::new(config, self.fail_close.load(Ordering::SeqCst)));
        self.opened.lock().unwrap().push(Arc::clone(&driver));
        Ok(driver)
    }
}

pub fn config(host: &str, database: &str) -> ConnectionConfig {
    serde_json::from_value(serde_json::json!({
        "host": host,
        "port": 5432,
        "username": "postgres",
        "password": "secret",
        "database": database,
        "ssl_mode": false
    }))
    .unwrap()
}

pub fn state(connector: Arc<FakeConnector>) -> Arc<AppState> {
    Arc::new(AppState::new(connector, Timeouts::default()))
}

pub fn app(connector: Arc<FakeConnector>) -> (Router, Arc<AppState>) {
    let state = state(connector);
    (pgweb::app(Arc::clone(&state)), state)
}

/// Sends one request and decodes the JSON body (or `Value::Null` if empty).
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn connect(app: &Router, host: &str, database: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/connect",
        Some(serde_json::json!({
            "host": host,
            "port": 5432,
            "username": "postgres",
            "password": "secret",
            "database": database,
            "ssl_mode": false
        })),
    )
    .await
}
