/// User model and database operations
///
/// Users are the internal staff of the organisation. Each user has one
/// [`Role`]; `admin` and `owner` form the elevated tier.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id            INTEGER PRIMARY KEY AUTOINCREMENT,
///     email         TEXT NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     first_name    TEXT NOT NULL,
///     last_name     TEXT NOT NULL,
///     role          TEXT NOT NULL DEFAULT 'user',
///     created_at    TEXT NOT NULL,
///     updated_at    TEXT NOT NULL
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::models::user::{CreateUser, Role, User};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "user@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ada".to_string(),
///     last_name: "Lovelace".to_string(),
///     role: Role::Sales,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "user@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::page::{push_search, Page, PageRequest, Where};

/// Staff role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Sales,
    Admin,
    Owner,
}

impl Role {
    /// Whether the role belongs to the elevated tier
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Sales => "sales",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "sales" => Ok(Role::Sales),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// User model representing a staff account
///
/// Passwords are stored as Argon2id digests and never serialized.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,

    /// Login email, unique across users
    pub email: String,

    /// Argon2id PHC digest
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id digest (NOT the plaintext password)
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Input for updating profile fields
///
/// Only `Some` fields are written. Role and password have their own
/// operations.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

const COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, created_at, updated_at";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a database error if the email already exists (unique
    /// constraint violation) or the connection fails.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.role)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        tracing::info!(user_id = user.id, role = %user.role, "Created user");
        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds a user by exact email
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(executor)
            .await
    }

    /// Lists users matching `q` on email, first or last name, newest first
    pub async fn list(pool: &SqlitePool, request: &PageRequest) -> Result<Page<Self>, sqlx::Error> {
        let pattern = request.search_pattern();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, pattern.as_deref());
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM users"));
        push_filters(&mut select, pattern.as_deref());
        select.push(" ORDER BY id DESC");
        request.push_limit(&mut select);
        let items = select.build_query_as::<User>().fetch_all(pool).await?;

        Ok(Page::new(items, request, total))
    }

    /// Updates profile fields
    ///
    /// # Returns
    ///
    /// The updated user, or `None` if no user has this ID
    pub async fn update<'e, E>(executor: E, id: i64, data: UpdateUser) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE(?, email),
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.email)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Replaces the password digest
    ///
    /// Returns `false` if no user has this ID.
    pub async fn set_password<'e, E>(executor: E, id: i64, password_hash: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the password only if the stored digest is still `expected_hash`
    ///
    /// Returns `false` when another write replaced the digest first.
    pub async fn replace_password<'e, E>(
        executor: E,
        id: i64,
        expected_hash: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = ?",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_hash)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Changes the role
    pub async fn set_role<'e, E>(executor: E, id: i64, role: Role) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(role)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a user and detaches everything they own
    ///
    /// In one transaction: clears `owner_id` on their accounts and
    /// opportunities, deletes their sessions, revokes their tokens and
    /// removes the user row. Tokens are kept for the audit trail.
    ///
    /// # Returns
    ///
    /// `true` if the user existed
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let now = Utc::now();

        sqlx::query("UPDATE accounts SET owner_id = NULL WHERE owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE opportunities SET owner_id = NULL WHERE owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE tokens SET revoked = 1, revoked_at = COALESCE(revoked_at, ?) WHERE user_id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(user_id = id, "Deleted user");
        }
        Ok(deleted)
    }

    /// Counts all users
    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }

    /// Display name, `first last`
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, pattern: Option<&str>) {
    let mut clause = Where::new();
    if let Some(pattern) = pattern {
        push_search(
            clause.and(builder),
            &["email", "first_name", "last_name"],
            pattern,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::pool;

    fn new_user(email: &str, role: Role) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
        }
    }

    #[test]
    fn test_role_parsing_and_tiers() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" sales ".parse::<Role>().unwrap(), Role::Sales);
        assert!("root".parse::<Role>().is_err());
        assert!(Role::Owner.is_elevated());
        assert!(Role::Admin.is_elevated());
        assert!(!Role::Sales.is_elevated());
        assert!(!Role::User.is_elevated());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: 1,
            email: "a@b.c".to_string(),
            password_hash: "secret".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role: Role::Owner,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "owner");
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let pool = pool().await;
        let user = User::create(&pool, new_user("find@example.com", Role::Sales))
            .await
            .unwrap();

        assert_eq!(user.role, Role::Sales);
        let by_id = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "find@example.com");
        let by_email = User::find_by_email(&pool, "find@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(User::find_by_email(&pool, "FIND@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let pool = pool().await;
        User::create(&pool, new_user("dup@example.com", Role::User))
            .await
            .unwrap();
        let err = User::create(&pool, new_user("dup@example.com", Role::User))
            .await
            .unwrap_err();
        assert!(err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_list_search_and_paging() {
        let pool = pool().await;
        for i in 0..5 {
            User::create(&pool, new_user(&format!("staff{i}@example.com"), Role::User))
                .await
                .unwrap();
        }
        User::create(&pool, new_user("boss@corp.test", Role::Admin))
            .await
            .unwrap();

        let page = User::list(&pool, &PageRequest::new(Some("example"), 1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].email, "staff4@example.com");

        let last = User::list(&pool, &PageRequest::new(Some("example"), 3, 2))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);

        let all = User::list(&pool, &PageRequest::default()).await.unwrap();
        assert_eq!(all.total, 6);
    }

    #[tokio::test]
    async fn test_update_and_role_change() {
        let pool = pool().await;
        let user = User::create(&pool, new_user("upd@example.com", Role::User))
            .await
            .unwrap();

        let updated = User::update(
            &pool,
            user.id,
            UpdateUser {
                first_name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.first_name, "Renamed");
        assert_eq!(updated.email, "upd@example.com");

        let promoted = User::set_role(&pool, user.id, Role::Admin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);

        assert!(User::update(&pool, 999, UpdateUser::default())
            .await
            .unwrap()
            .is_none());
        assert!(User::set_password(&pool, user.id, "$argon2id$new").await.unwrap());
        assert!(!User::set_password(&pool, 999, "$argon2id$new").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_password_requires_current_digest() {
        let pool = pool().await;
        let user = User::create(&pool, new_user("swap@example.com", Role::User))
            .await
            .unwrap();

        assert!(!User::replace_password(&pool, user.id, "$argon2id$stale", "$argon2id$a").await.unwrap());
        assert!(User::replace_password(&pool, user.id, &user.password_hash, "$argon2id$a").await.unwrap());
        assert!(!User::replace_password(&pool, user.id, &user.password_hash, "$argon2id$b").await.unwrap());

        let stored = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "$argon2id$a");
    }

    #[tokio::test]
    async fn test_delete_detaches_owned_rows() {
        let pool = pool().await;
        let user = User::create(&pool, new_user("gone@example.com", Role::Sales))
            .await
            .unwrap();

        let account_id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (name, owner_id, created_at) VALUES ('Acme', ?, ?) RETURNING id",
        )
        .bind(user.id)
        .bind(Utc::now())
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO opportunities (name, account_id, owner_id, created_at) VALUES ('Deal', ?, ?, ?)",
        )
        .bind(account_id)
        .bind(user.id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO tokens (user_id, token_prefix, token_hash, created_at) VALUES (?, 'abcdefgh', 'h', ?)",
        )
        .bind(user.id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        assert!(User::delete(&pool, user.id).await.unwrap());
        assert!(!User::delete(&pool, user.id).await.unwrap());

        let account_owner: Option<i64> =
            sqlx::query_scalar("SELECT owner_id FROM accounts WHERE id = ?")
                .bind(account_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(account_owner.is_none());

        let opp_owner: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM opportunities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(opp_owner.is_none());

        let (revoked, count): (bool, i64) =
            sqlx::query_as("SELECT revoked, COUNT(*) FROM tokens WHERE user_id = ?")
                .bind(user.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(revoked);
        assert_eq!(count, 1);
    }
}
