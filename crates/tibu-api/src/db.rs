//! PostgreSQL connection pool and schema migrations

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tibu_core::DatabaseConfig;

/// Embedded migrations from `crates/tibu-api/migrations`
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a pool sized per configuration
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(pool_size = config.pool_size, "Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.url)
        .await?;
    tracing::info!("Database connected successfully");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
