//! Applies the service's schema migrations to `PGWEB_DATABASE_URL`.

use pgweb::migrate::{self, MigrateSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match MigrateSettings::from_env() {
        Ok(settings) => migrate::run(&settings).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => tracing::info!("migrations applied successfully"),
        Err(e) => {
            tracing::error!(error = %e, "migrations failed");
            std::process::exit(1);
        }
    }
}
