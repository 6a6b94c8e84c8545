/// Opportunity model and database operations
///
/// An opportunity is a deal with an account. It may be owned by a user;
/// standard-tier users only ever see opportunities they own, and that
/// restriction is pushed into every query through `owner` arguments.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE opportunities (
///     id         INTEGER PRIMARY KEY AUTOINCREMENT,
///     name       TEXT NOT NULL,
///     stage      TEXT NOT NULL DEFAULT 'Prospecting',
///     value      INTEGER,
///     close_date TEXT,
///     account_id INTEGER NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
///     owner_id   INTEGER REFERENCES users (id) ON DELETE SET NULL,
///     created_at TEXT NOT NULL
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::page::{push_search, search_pattern, Page, PageRequest, Where};

/// Stage assigned when none is given
pub const DEFAULT_STAGE: &str = "Prospecting";

/// Stages that count as closed
pub const CLOSED_STAGES: [&str; 2] = ["Closed-Won", "Closed-Lost"];

/// Opportunity (deal) record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Opportunity {
    pub id: i64,
    pub name: String,
    pub stage: String,

    /// Deal value in whole currency units
    pub value: Option<i64>,

    pub close_date: Option<NaiveDate>,
    pub account_id: i64,

    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Writable opportunity fields
#[derive(Debug, Clone, Default)]
pub struct OpportunityData {
    pub name: String,

    /// `None` stores [`DEFAULT_STAGE`]
    pub stage: Option<String>,

    pub value: Option<i64>,
    pub close_date: Option<NaiveDate>,
    pub account_id: i64,
    pub owner_id: Option<i64>,
}

/// One exported CSV row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OpportunityExport {
    pub name: String,
    pub account: String,
    pub stage: String,
    pub value: Option<i64>,
    pub close_date: Option<NaiveDate>,
    pub owner_email: Option<String>,
}

/// Headline numbers for the dashboard
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct PipelineSummary {
    /// Opportunities not in a closed stage
    pub open_count: i64,

    /// Sum of `value` over open opportunities
    pub open_value: i64,
}

const COLUMNS: &str = "id, name, stage, value, close_date, account_id, owner_id, created_at";

const JOINED: &str = "SELECT o.id, o.name, o.stage, o.value, o.close_date, o.account_id, \
    a.name AS account_name, o.owner_id, o.created_at \
    FROM opportunities o JOIN accounts a ON a.id = o.account_id";

const ORDER: &str = " ORDER BY o.close_date IS NULL, o.close_date ASC, o.id ASC";

impl Opportunity {
    pub async fn create<'e, E>(executor: E, data: OpportunityData) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Opportunity>(&format!(
            r#"
            INSERT INTO opportunities (name, stage, value, close_date, account_id, owner_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.stage.unwrap_or_else(|| DEFAULT_STAGE.to_string()))
        .bind(data.value)
        .bind(data.close_date)
        .bind(data.account_id)
        .bind(data.owner_id)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Opportunity>(&format!("{JOINED} WHERE o.id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists opportunities matching `q` on name or account name
    ///
    /// `owner` restricts the page and the total to one owner. Ordered by
    /// close date (undated last), then ID.
    pub async fn list(
        pool: &SqlitePool,
        request: &PageRequest,
        owner: Option<i64>,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = request.search_pattern();

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM opportunities o JOIN accounts a ON a.id = o.account_id",
        );
        push_filters(&mut count, pattern.as_deref(), owner);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(JOINED);
        push_filters(&mut select, pattern.as_deref(), owner);
        select.push(ORDER);
        request.push_limit(&mut select);
        let items = select.build_query_as::<Opportunity>().fetch_all(pool).await?;

        Ok(Page::new(items, request, total))
    }

    /// Every visible opportunity matching `q` in export layout
    pub async fn export(
        pool: &SqlitePool,
        q: Option<&str>,
        owner: Option<i64>,
    ) -> Result<Vec<OpportunityExport>, sqlx::Error> {
        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT o.name, a.name AS account, o.stage, o.value, o.close_date, u.email AS owner_email \
             FROM opportunities o JOIN accounts a ON a.id = o.account_id \
             LEFT JOIN users u ON u.id = o.owner_id",
        );
        push_filters(&mut select, search_pattern(q).as_deref(), owner);
        select.push(ORDER);

        select.build_query_as::<OpportunityExport>().fetch_all(pool).await
    }

    /// Open opportunities closing soonest
    pub async fn open_soonest(
        pool: &SqlitePool,
        owner: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut select = QueryBuilder::<Sqlite>::new(JOINED);
        let mut clause = push_filters(&mut select, None, owner);
        push_open(clause.and(&mut select));
        select.push(ORDER).push(" LIMIT ").push_bind(limit);

        select.build_query_as::<Opportunity>().fetch_all(pool).await
    }

    /// Count and value of open opportunities
    pub async fn pipeline(pool: &SqlitePool, owner: Option<i64>) -> Result<PipelineSummary, sqlx::Error> {
        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS open_count, COALESCE(SUM(o.value), 0) AS open_value FROM opportunities o",
        );
        let mut clause = push_filters(&mut select, None, owner);
        push_open(clause.and(&mut select));

        select.build_query_as::<PipelineSummary>().fetch_one(pool).await
    }

    /// Replaces all writable fields
    pub async fn update<'e, E>(executor: E, id: i64, data: OpportunityData) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Opportunity>(&format!(
            r#"
            UPDATE opportunities
            SET name = ?, stage = ?, value = ?, close_date = ?, account_id = ?, owner_id = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.stage.unwrap_or_else(|| DEFAULT_STAGE.to_string()))
        .bind(data.value)
        .bind(data.close_date)
        .bind(data.account_id)
        .bind(data.owner_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM opportunities WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn is_open(&self) -> bool {
        !CLOSED_STAGES.contains(&self.stage.as_str())
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, pattern: Option<&str>, owner: Option<i64>) -> Where {
    let mut clause = Where::new();
    if let Some(owner) = owner {
        clause.and(builder).push("o.owner_id = ").push_bind(owner);
    }
    if let Some(pattern) = pattern {
        push_search(clause.and(builder), &["o.name", "a.name"], pattern);
    }
    clause
}

fn push_open(builder: &mut QueryBuilder<'_, Sqlite>) {
    builder.push("o.stage NOT IN (");
    let mut stages = builder.separated(", ");
    for stage in CLOSED_STAGES {
        stages.push_bind(stage);
    }
    stages.push_unseparated(")");
}
