/// Database layer for Rolodex
///
/// - `pool`: SQLite connection pool management with health checks
/// - `migrations`: embedded schema migrations
///
/// Models live in the `models` module at crate root level.

pub mod migrations;
pub mod pool;

use sqlx::SqlitePool;

/// Opens a pool and brings the schema up to date
///
/// Convenience used by the server at startup and by tests.
pub async fn connect(config: pool::DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let pool = pool::create_pool(config).await?;
    migrations::run_migrations(&pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    Ok(pool)
}
