/// Database migration runner
///
/// Migrations live in `rolodex-shared/migrations/` and are embedded into the
/// binary at compile time by `sqlx::migrate!`, so a deployed server never
/// needs the SQL files on disk.
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::db::pool::{create_pool, DatabaseConfig};
/// use rolodex_shared::db::migrations::{run_migrations, get_migration_status};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::default()).await?;
///
///     run_migrations(&pool).await?;
///
///     let status = get_migration_status(&pool).await?;
///     println!("Applied {} migrations", status.applied_migrations);
///
///     Ok(())
/// }
/// ```

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Number of migrations that have been applied
    pub applied_migrations: usize,

    /// Latest applied migration version (timestamp)
    pub latest_version: Option<i64>,
}

/// Runs all pending database migrations
///
/// # Errors
///
/// Returns an error if a migration fails to execute. A failed migration is
/// rolled back and leaves the schema at the previous version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting database migrations");

    let migrations = sqlx::migrate!("./migrations");

    match migrations.run(pool).await {
        Ok(()) => {
            info!("All database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}

/// Gets the current migration status
///
/// # Errors
///
/// Returns an error if the migrations table cannot be queried
pub async fn get_migration_status(pool: &SqlitePool) -> Result<MigrationStatus, sqlx::Error> {
    debug!("Checking migration status");

    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    if table_exists == 0 {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await?;

    debug!(
        applied_migrations = count,
        latest_version = ?latest_version,
        "Migration status retrieved"
    );

    Ok(MigrationStatus {
        applied_migrations: count as usize,
        latest_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, DatabaseConfig};

    #[tokio::test]
    async fn test_status_before_and_after_migrations() {
        let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();

        let before = get_migration_status(&pool).await.unwrap();
        assert_eq!(before.applied_migrations, 0);
        assert!(before.latest_version.is_none());

        run_migrations(&pool).await.unwrap();

        let after = get_migration_status(&pool).await.unwrap();
        assert!(after.applied_migrations >= 1);
        assert!(after.latest_version.is_some());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
