/// Login session model
///
/// Sessions are server-side. The browser holds a random secret in the
/// session cookie; the table stores only its SHA-256 hex digest, so a leaked
/// database does not yield usable cookies.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sessions (
///     id           INTEGER PRIMARY KEY AUTOINCREMENT,
///     session_hash TEXT NOT NULL UNIQUE,
///     user_id      INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     created_at   TEXT NOT NULL,
///     last_seen_at TEXT NOT NULL,
///     expires_at   TEXT NOT NULL
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Executor, Sqlite, SqlitePool};

/// Login session record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,

    #[serde(skip_serializing)]
    pub session_hash: String,

    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, session_hash, user_id, created_at, last_seen_at, expires_at";

impl Session {
    /// Creates a session that expires after `lifetime` of inactivity
    pub async fn create<'e, E>(
        executor: E,
        user_id: i64,
        session_hash: &str,
        lifetime: Duration,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (session_hash, user_id, created_at, last_seen_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(session_hash)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .bind(now + lifetime)
        .fetch_one(executor)
        .await
    }

    /// Finds an unexpired session by digest
    ///
    /// An expired row is deleted on sight.
    pub async fn find_active(
        pool: &SqlitePool,
        session_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {COLUMNS} FROM sessions WHERE session_hash = ?"
        ))
        .bind(session_hash)
        .fetch_optional(pool)
        .await?;

        match session {
            Some(session) if session.expires_at <= now => {
                tracing::debug!(session_id = session.id, "Session expired");
                Self::delete(pool, session.id).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Slides the idle expiry forward from now
    pub async fn touch<'e, E>(executor: E, id: i64, lifetime: Duration) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query("UPDATE sessions SET last_seen_at = ?, expires_at = ? WHERE id = ?")
            .bind(now)
            .bind(now + lifetime)
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the session with this digest, if any
    pub async fn delete_by_hash<'e, E>(executor: E, session_hash: &str) -> Result<Option<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("DELETE FROM sessions WHERE session_hash = ? RETURNING user_id")
            .bind(session_hash)
            .fetch_optional(executor)
            .await
    }

    /// Deletes every session of a user
    pub async fn delete_for_user<'e, E>(executor: E, user_id: i64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{pool, user};
    use crate::models::user::Role;

    #[tokio::test]
    async fn test_create_find_touch() {
        let pool = pool().await;
        let owner = user(&pool, "s@example.com", Role::User).await;

        let session = Session::create(&pool, owner.id, "digest-1", Duration::seconds(60))
            .await
            .unwrap();
        let found = Session::find_active(&pool, "digest-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);

        Session::touch(&pool, session.id, Duration::hours(2)).await.unwrap();
        let later = Utc::now() + Duration::minutes(90);
        assert!(Session::find_active(&pool, "digest-1", later)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let pool = pool().await;
        let owner = user(&pool, "x@example.com", Role::User).await;
        Session::create(&pool, owner.id, "digest-2", Duration::seconds(1))
            .await
            .unwrap();

        let later = Utc::now() + Duration::seconds(5);
        assert!(Session::find_active(&pool, "digest-2", later)
            .await
            .unwrap()
            .is_none());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_delete_by_hash_and_user() {
        let pool = pool().await;
        let owner = user(&pool, "d@example.com", Role::User).await;
        for digest in ["a", "b", "c"] {
            Session::create(&pool, owner.id, digest, Duration::seconds(60))
                .await
                .unwrap();
        }

        assert_eq!(Session::delete_by_hash(&pool, "a").await.unwrap(), Some(owner.id));
        assert_eq!(Session::delete_by_hash(&pool, "a").await.unwrap(), None);
        assert_eq!(Session::delete_for_user(&pool, owner.id).await.unwrap(), 2);
    }
}
