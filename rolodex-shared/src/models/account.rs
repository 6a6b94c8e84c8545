/// Account model and database operations
///
/// An account is a company. Contacts and opportunities belong to exactly
/// one account and are removed with it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id         INTEGER PRIMARY KEY AUTOINCREMENT,
///     name       TEXT NOT NULL UNIQUE,
///     industry   TEXT,
///     phone      TEXT,
///     website    TEXT,
///     owner_id   INTEGER REFERENCES users (id) ON DELETE SET NULL,
///     created_at TEXT NOT NULL
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::page::{push_search, search_pattern, Page, PageRequest, Where};

/// Account (company) record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,

    /// Unique display name
    pub name: String,

    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Writable account fields
///
/// Used for creation and for full replacement on update.
#[derive(Debug, Clone, Default)]
pub struct AccountData {
    pub name: String,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub owner_id: Option<i64>,
}

/// One exported CSV row; field order is the CSV header
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccountExport {
    pub name: String,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub owner_email: Option<String>,
}

const COLUMNS: &str = "id, name, industry, phone, website, owner_id, created_at";

impl Account {
    /// Creates an account
    ///
    /// # Errors
    ///
    /// Returns a unique violation if the name is taken.
    pub async fn create<'e, E>(executor: E, data: AccountData) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (name, industry, phone, website, owner_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.industry)
        .bind(data.phone)
        .bind(data.website)
        .bind(data.owner_id)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Account>(&format!("SELECT {COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds an account by exact name
    pub async fn find_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Account>(&format!("SELECT {COLUMNS} FROM accounts WHERE name = ?"))
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// Lists accounts whose name matches `q`, ordered by name
    pub async fn list(pool: &SqlitePool, request: &PageRequest) -> Result<Page<Self>, sqlx::Error> {
        let pattern = request.search_pattern();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM accounts");
        push_filters(&mut count, pattern.as_deref());
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM accounts"));
        push_filters(&mut select, pattern.as_deref());
        select.push(" ORDER BY name ASC");
        request.push_limit(&mut select);
        let items = select.build_query_as::<Account>().fetch_all(pool).await?;

        Ok(Page::new(items, request, total))
    }

    /// Every account matching `q` in export layout
    pub async fn export(pool: &SqlitePool, q: Option<&str>) -> Result<Vec<AccountExport>, sqlx::Error> {
        let pattern = search_pattern(q);

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT a.name, a.industry, a.phone, a.website, u.email AS owner_email \
             FROM accounts a LEFT JOIN users u ON u.id = a.owner_id",
        );
        let mut clause = Where::new();
        if let Some(pattern) = pattern.as_deref() {
            push_search(clause.and(&mut select), &["a.name"], pattern);
        }
        select.push(" ORDER BY a.name ASC");

        select.build_query_as::<AccountExport>().fetch_all(pool).await
    }

    /// Replaces all writable fields
    pub async fn update<'e, E>(executor: E, id: i64, data: AccountData) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET name = ?, industry = ?, phone = ?, website = ?, owner_id = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.industry)
        .bind(data.phone)
        .bind(data.website)
        .bind(data.owner_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Deletes an account with its contacts and opportunities
    ///
    /// All three deletes run in one transaction.
    ///
    /// # Returns
    ///
    /// `true` if the account existed
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let contacts = sqlx::query("DELETE FROM contacts WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let opportunities = sqlx::query("DELETE FROM opportunities WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        tx.commit().await?;

        if deleted {
            tracing::info!(account_id = id, contacts, opportunities, "Deleted account");
        }
        Ok(deleted)
    }

    /// Most recently created accounts
    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM accounts ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(pool)
            .await
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, pattern: Option<&str>) {
    let mut clause = Where::new();
    if let Some(pattern) = pattern {
        push_search(clause.and(builder), &["name"], pattern);
    }
}
