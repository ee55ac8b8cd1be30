use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::Error;

/// Credentials and target of the database the browser connects to.
///
/// Decoded from the `POST /connect` body. Never written to disk.
#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub ssl_mode: bool,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is required".into()));
        }
        if self.port <= 0 {
            return Err(Error::InvalidConfig("port must be > 0".into()));
        }
        if self.port > i64::from(u16::MAX) {
            return Err(Error::InvalidConfig(format!(
                "port must be <= {}",
                u16::MAX
            )));
        }
        if self.database.trim().is_empty() {
            return Err(Error::InvalidConfig("database is required".into()));
        }
        Ok(())
    }

    pub fn ssl_mode(&self) -> PgSslMode {
        if self.ssl_mode {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        }
    }

    /// Connect options derived from the config. Call [`validate`](Self::validate) first.
    pub fn connect_options(&self) -> PgConnectOptions {
        let port = u16::try_from(self.port).unwrap_or_default();
        PgConnectOptions::new()
            .host(&self.host)
            .port(port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode())
    }

    /// `postgres://` URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        let sslmode = if self.ssl_mode { "require" } else { "disable" };
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode={}",
            self.username, self.host, self.port, self.database, sslmode
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Accepts the port as a JSON number or a numeric string. `null` and `""` mean 0,
/// which validation rejects.
fn lenient_port<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(i64),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Port::Number(n)) => Ok(n),
        Some(Port::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            s.parse::<i64>()
                .map_err(|e| serde::de::Error::custom(format!("invalid number {s:?}: {e}")))
        }
    }
}

/// A decoded column value as it comes off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

/// JSON-safe cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<RawValue> for CellValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Null => CellValue::Null,
            RawValue::Bool(v) => CellValue::Bool(v),
            RawValue::Int(v) => CellValue::Int(v),
            RawValue::Float(v) if v.is_finite() => CellValue::Float(v),
            // JSON has no NaN or infinities; keep Postgres' spelling as text.
            RawValue::Float(v) if v.is_nan() => CellValue::Text("NaN".into()),
            RawValue::Float(v) if v > 0.0 => CellValue::Text("Infinity".into()),
            RawValue::Float(_) => CellValue::Text("-Infinity".into()),
            RawValue::Text(v) => CellValue::Text(v),
            RawValue::Timestamp(v) => CellValue::Timestamp(v),
            RawValue::Bytes(v) => CellValue::Text(String::from_utf8_lossy(&v).into_owned()),
        }
    }
}

pub type RowMap = BTreeMap<String, CellValue>;

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub result: &'static str,
}

impl ExecResult {
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            result: "statement executed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub constraints: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndexDefinition {
    pub index: String,
    pub table: String,
}
