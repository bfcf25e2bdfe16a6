use crate::{config::DatabaseConfig, errors::Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Create the PostgreSQL pool backing the `postgres` storage backend
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    tracing::info!(
        max_connections = config.max_connections,
        "Connecting to control plane database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Applying control plane schema migrations");
    sqlx::migrate!("./src/db/migrations").run(pool).await?;
    Ok(())
}

/// Round-trip a trivial query; used by readiness checks
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
