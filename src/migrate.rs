//! Applies schema migrations with the Atlas CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

const DEFAULT_ATLAS_BINARY: &str = "atlas";
const DEFAULT_DIR: &str = "migrations";

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("PGWEB_DATABASE_URL must be set")]
    MissingDatabaseUrl,

    #[error("failed to resolve migrations dir: {0}")]
    ResolveDir(#[source] std::io::Error),

    #[error("failed to start {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("atlas migrate apply failed: {0}")]
    Failed(std::process::ExitStatus),
}

/// Where to find Atlas, the migrations, and the target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateSettings {
    pub database_url: String,
    pub atlas_bin: String,
    pub migrations_dir: String,
}

impl MigrateSettings {
    /// Reads `PGWEB_DATABASE_URL`, `PGWEB_ATLAS_BIN` and `PGWEB_MIGRATIONS_DIR`.
    pub fn from_env() -> Result<Self, MigrateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(env: F) -> Result<Self, MigrateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("PGWEB_DATABASE_URL").ok_or(MigrateError::MissingDatabaseUrl)?;
        Ok(Self {
            database_url,
            atlas_bin: non_empty("PGWEB_ATLAS_BIN").unwrap_or_else(|| DEFAULT_ATLAS_BINARY.into()),
            migrations_dir: non_empty("PGWEB_MIGRATIONS_DIR").unwrap_or_else(|| DEFAULT_DIR.into()),
        })
    }

    /// Arguments passed to the Atlas binary.
    pub fn args(&self) -> Result<Vec<String>, MigrateError> {
        Ok(vec![
            "migrate".into(),
            "apply".into(),
            "--dir".into(),
            normalize_dir(&self.migrations_dir)?,
            "--url".into(),
            self.database_url.clone(),
        ])
    }
}

/// Turns a directory into the `file://` URL Atlas expects.
pub fn normalize_dir(dir: &str) -> Result<String, MigrateError> {
    if dir.starts_with("file://") {
        return Ok(dir.to_string());
    }

    let path = Path::new(dir);
    let abs: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(MigrateError::ResolveDir)?
            .join(path)
    };

    Ok(format!("file://{}", abs.display()))
}

/// Runs `atlas migrate apply` with inherited stdio and environment. Dropping
/// the returned future kills the child.
pub async fn run(settings: &MigrateSettings) -> Result<(), MigrateError> {
    let args = settings.args()?;
    tracing::info!(bin = %settings.atlas_bin, dir = %args[3], "applying migrations");

    let status = Command::new(&settings.atlas_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| MigrateError::Spawn {
            bin: settings.atlas_bin.clone(),
            source,
        })?;

    if !status.success() {
        return Err(MigrateError::Failed(status));
    }
    Ok(())
}
