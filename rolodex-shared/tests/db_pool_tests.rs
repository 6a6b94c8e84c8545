/// Integration tests for the database connection pool
///
/// Each test opens its own SQLite file in a temporary directory, so the
/// tests run in parallel.

use rolodex_shared::db::pool::{close_pool, create_pool, health_check, DatabaseConfig};
use sqlx::Row;
use tempfile::TempDir;

/// Config for a fresh database file inside `dir`
fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("pool.db").display()),
        max_connections: 4,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_pool_creates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir)).await;
    assert!(pool.is_ok(), "Failed to create pool: {:?}", pool.err());

    assert!(dir.path().join("pool.db").exists());
    close_pool(pool.unwrap()).await;
}

#[tokio::test]
async fn test_create_pool_with_invalid_path() {
    let config = DatabaseConfig {
        url: "sqlite:///nonexistent-directory/deeper/rolodex.db".to_string(),
        connect_timeout_seconds: 2,
        ..Default::default()
    };

    let result = create_pool(config).await;
    assert!(result.is_err(), "Should fail for a directory that does not exist");
}

#[tokio::test]
async fn test_health_check_success() {
    let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();
    assert!(health_check(&pool).await.is_ok());
    close_pool(pool).await;
}

#[tokio::test]
async fn test_foreign_keys_enforced_on_every_connection() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir)).await.unwrap();

    // Hold several connections at once so more than one is opened
    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.acquire().await.unwrap());
    }
    for conn in held.iter_mut() {
        let row = sqlx::query("PRAGMA foreign_keys").fetch_one(&mut **conn).await.unwrap();
        let enabled: i64 = row.get(0);
        assert_eq!(enabled, 1);
    }
    drop(held);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_concurrent_queries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10_i64 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let row = sqlx::query("SELECT ? * 2").bind(i).fetch_one(&pool).await.unwrap();
            row.get::<i64, _>(0)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results.sort();
    assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<i64>>());

    close_pool(pool).await;
}
