//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

use crate::state::Timeouts;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Pool and deadline settings applied to every connection the browser opens.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    #[serde(default = "default_catalog_timeout_secs")]
    pub catalog_timeout_secs: u64,

    #[serde(default = "default_table_data_timeout_secs")]
    pub table_data_timeout_secs: u64,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pgweb=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    3
}

fn default_ping_timeout_secs() -> u64 {
    2
}

fn default_catalog_timeout_secs() -> u64 {
    2
}

fn default_table_data_timeout_secs() -> u64 {
    5
}

fn default_query_timeout_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            catalog_timeout_secs: default_catalog_timeout_secs(),
            table_data_timeout_secs: default_table_data_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            ping: Duration::from_secs(self.ping_timeout_secs),
            catalog: Duration::from_secs(self.catalog_timeout_secs),
            table_data: Duration::from_secs(self.table_data_timeout_secs),
            query: Duration::from_secs(self.query_timeout_secs),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PGWEB_HOST` overrides `server.host`
/// - `PGWEB_PORT` overrides `server.port`
/// - `PGWEB_LOG_LEVEL` overrides `logging.level`
/// - `PGWEB_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if an override does not parse.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(path: Option<&str>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Some(host) = env("PGWEB_HOST") {
        config.server.host = host.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "PGWEB_HOST",
            value: host.clone(),
        })?;
    }

    if let Some(port) = env("PGWEB_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "PGWEB_PORT",
            value: port.clone(),
        })?;
    }

    if let Some(level) = env("PGWEB_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(json) = env("PGWEB_LOG_JSON") {
        config.logging.json = json.eq_ignore_ascii_case("true") || json == "1";
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let db = &config.database;
    if db.max_connections == 0 {
        return Err(ConfigError::Invalid(
            "database.max_connections must be at least 1".into(),
        ));
    }
    let timeouts = [
        ("database.acquire_timeout_secs", db.acquire_timeout_secs),
        ("database.ping_timeout_secs", db.ping_timeout_secs),
        ("database.catalog_timeout_secs", db.catalog_timeout_secs),
        ("database.table_data_timeout_secs", db.table_data_timeout_secs),
        ("database.query_timeout_secs", db.query_timeout_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
    }
    Ok(())
}
