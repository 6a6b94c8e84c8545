/// Contact model and database operations
///
/// A contact is a person at an account. Reads join the account so list
/// rows carry `account_name`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::page::{push_search, search_pattern, Page, PageRequest, Where};

/// Contact record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub account_id: i64,

    /// Name of the owning account; absent on rows returned by writes
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Writable contact fields
#[derive(Debug, Clone, Default)]
pub struct ContactData {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub account_id: i64,
}

/// One exported CSV row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactExport {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub company: String,
}

const COLUMNS: &str = "id, first_name, last_name, email, phone, role_title, account_id, created_at";

const JOINED: &str = "SELECT c.id, c.first_name, c.last_name, c.email, c.phone, c.role_title, \
    c.account_id, a.name AS account_name, c.created_at \
    FROM contacts c JOIN accounts a ON a.id = c.account_id";

const SEARCH_COLUMNS: &[&str] = &["c.first_name", "c.last_name", "c.email", "a.name"];

impl Contact {
    pub async fn create<'e, E>(executor: E, data: ContactData) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts (first_name, last_name, email, phone, role_title, account_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.role_title)
        .bind(data.account_id)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Contact>(&format!("{JOINED} WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists contacts matching `q` on name, email or account name, newest first
    pub async fn list(pool: &SqlitePool, request: &PageRequest) -> Result<Page<Self>, sqlx::Error> {
        let pattern = request.search_pattern();

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM contacts c JOIN accounts a ON a.id = c.account_id",
        );
        push_filters(&mut count, pattern.as_deref());
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(JOINED);
        push_filters(&mut select, pattern.as_deref());
        select.push(" ORDER BY c.id DESC");
        request.push_limit(&mut select);
        let items = select.build_query_as::<Contact>().fetch_all(pool).await?;

        Ok(Page::new(items, request, total))
    }

    /// Every contact matching `q` in export layout
    pub async fn export(pool: &SqlitePool, q: Option<&str>) -> Result<Vec<ContactExport>, sqlx::Error> {
        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT c.first_name, c.last_name, c.email, c.phone, c.role_title, a.name AS company \
             FROM contacts c JOIN accounts a ON a.id = c.account_id",
        );
        push_filters(&mut select, search_pattern(q).as_deref());
        select.push(" ORDER BY c.id DESC");

        select.build_query_as::<ContactExport>().fetch_all(pool).await
    }

    /// Replaces all writable fields
    pub async fn update<'e, E>(executor: E, id: i64, data: ContactData) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts
            SET first_name = ?, last_name = ?, email = ?, phone = ?, role_title = ?, account_id = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.role_title)
        .bind(data.account_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(pool)
            .await
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, pattern: Option<&str>) {
    let mut clause = Where::new();
    if let Some(pattern) = pattern {
        push_search(clause.and(builder), SEARCH_COLUMNS, pattern);
    }
}
