/// Database connection pool management
///
/// Rolodex stores everything in SQLite through sqlx. The pool is created
/// once at startup and shared by every request handler via the application
/// state.
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: "sqlite://rolodex.db".to_string(),
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///
///     let row: (i64,) = sqlx::query_as("SELECT ?")
///         .bind(42i64)
///         .fetch_one(&pool)
///         .await?;
///
///     Ok(())
/// }
/// ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the database connection pool
///
/// All timeouts are specified in seconds for ease of configuration from environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL (e.g., "sqlite://rolodex.db" or "sqlite::memory:")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of idle connections to maintain
    pub min_connections: u32,

    /// Timeout for acquiring a connection from the pool (seconds)
    pub connect_timeout_seconds: u64,

    /// How long a connection can remain idle before being closed (seconds)
    ///
    /// None = connections never closed due to idle time
    pub idle_timeout_seconds: Option<u64>,

    /// Maximum lifetime of a connection before forced recycling (seconds)
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rolodex.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a private in-memory database
    ///
    /// An in-memory SQLite database lives exactly as long as its connection,
    /// so the pool is pinned to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: None,
            max_lifetime_seconds: None,
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Creates and initializes a SQLite connection pool
///
/// This function:
/// 1. Creates the database file if it does not exist
/// 2. Enables foreign key enforcement on every connection
/// 3. Switches file databases to WAL journaling
/// 4. Performs a health check to verify the database answers queries
///
/// # Errors
///
/// Returns an error if the URL is invalid, the file cannot be opened, or
/// the health check fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_seconds = config.connect_timeout_seconds,
        "Creating database connection pool"
    );

    let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    if !config.is_memory() {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut max_connections = config.max_connections;
    if config.is_memory() && max_connections != 1 {
        warn!(
            requested = max_connections,
            "In-memory databases are per-connection, forcing a single connection"
        );
        max_connections = 1;
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(config.min_connections.min(max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
        .max_lifetime(config.max_lifetime_seconds.map(Duration::from_secs));

    if config.is_memory() {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        debug!("Using in-memory database");
    }

    let pool = pool_options.connect_with(connect_options).await?;

    health_check(&pool).await?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Performs a health check on the database connection
///
/// # Errors
///
/// Returns an error if the health check query fails
pub async fn health_check(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Performing database health check");

    let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if result.0 == 1 {
        debug!("Database health check passed");
        Ok(())
    } else {
        warn!("Database health check returned unexpected value: {}", result.0);
        Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ))
    }
}

/// Gracefully closes the connection pool
pub async fn close_pool(pool: SqlitePool) {
    info!("Closing database connection pool");
    pool.close().await;
    info!("Database connection pool closed");
}
