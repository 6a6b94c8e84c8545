/// API token model and database operations
///
/// Tokens give programmatic access on behalf of a user.
///
/// # Security
///
/// - The plaintext is returned once by [`Token::issue`] and never stored
/// - Only an 8-character lookup prefix and an Argon2id digest are persisted
/// - Verification looks up candidates by prefix among unrevoked tokens and
///   checks each digest; results are never cached, so a revocation applies
///   to the very next request
/// - Revocation is one-way and idempotent; tokens are never deleted
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tokens (
///     id           INTEGER PRIMARY KEY AUTOINCREMENT,
///     user_id      INTEGER NOT NULL,
///     token_prefix TEXT NOT NULL,
///     token_hash   TEXT NOT NULL,
///     scopes       TEXT NOT NULL DEFAULT '',
///     created_at   TEXT NOT NULL,
///     expires_at   TEXT,
///     revoked      INTEGER NOT NULL DEFAULT 0,
///     revoked_at   TEXT
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::auth::password::{Hasher, PasswordConfig};
/// use rolodex_shared::models::token::{IssueToken, Token};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = Hasher::new(PasswordConfig::default())?;
///
/// let (token, plaintext) = Token::issue(&pool, &hasher, IssueToken {
///     user_id: 1,
///     ttl: None,
///     scopes: vec!["accounts:read".to_string()],
/// }).await?;
///
/// // IMPORTANT: hand plaintext to the caller now - it's never shown again!
/// let verified = Token::verify(&pool, &hasher, &plaintext).await?;
/// assert_eq!(verified.map(|t| t.id), Some(token.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::page::{Page, PageRequest, Where};
use crate::auth::password::{Hasher, PasswordError};
use crate::auth::token::{format_scopes, generate_token, parse_scopes, token_prefix, PREFIX_LENGTH};

/// Error type for token issuance and verification
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Token lifetime is out of range")]
    LifetimeOutOfRange,
}

/// API token record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Token {
    pub id: i64,

    /// User the token acts for
    pub user_id: i64,

    /// First 8 characters of the plaintext
    pub token_prefix: String,

    /// Argon2id digest of the plaintext
    #[serde(skip_serializing)]
    pub token_hash: String,

    /// Comma-separated scopes; empty means the user's full rights
    pub scopes: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Input for issuing a token
#[derive(Debug, Clone, Default)]
pub struct IssueToken {
    pub user_id: i64,

    /// Lifetime; `None` never expires
    pub ttl: Option<Duration>,

    pub scopes: Vec<String>,
}

const COLUMNS: &str =
    "id, user_id, token_prefix, token_hash, scopes, created_at, expires_at, revoked, revoked_at";

impl Token {
    /// Issues a new token
    ///
    /// # Returns
    ///
    /// Tuple of (stored record, plaintext). The plaintext cannot be
    /// recovered later.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::LifetimeOutOfRange` if the expiry is not a
    /// representable time, `TokenError::Password` if hashing fails, or
    /// `TokenError::Database` if the insert fails.
    pub async fn issue(
        pool: &SqlitePool,
        hasher: &Hasher,
        data: IssueToken,
    ) -> Result<(Self, String), TokenError> {
        let now = Utc::now();
        let expires_at = match data.ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or(TokenError::LifetimeOutOfRange)?),
            None => None,
        };

        let plaintext = generate_token();
        let digest = hasher.hash_async(plaintext.clone()).await?;

        let token = sqlx::query_as::<_, Token>(&format!(
            r#"
            INSERT INTO tokens (user_id, token_prefix, token_hash, scopes, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(token_prefix(&plaintext))
        .bind(digest)
        .bind(format_scopes(&data.scopes))
        .bind(now)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            token_id = token.id,
            user_id = token.user_id,
            expires_at = ?token.expires_at,
            "Issued API token"
        );

        Ok((token, plaintext))
    }

    /// Verifies a presented plaintext
    ///
    /// # Returns
    ///
    /// The matching token if it exists, is not revoked and has not expired;
    /// `None` otherwise.
    pub async fn verify(
        pool: &SqlitePool,
        hasher: &Hasher,
        presented: &str,
    ) -> Result<Option<Self>, TokenError> {
        if presented.len() < PREFIX_LENGTH {
            return Ok(None);
        }

        let candidates = sqlx::query_as::<_, Token>(&format!(
            "SELECT {COLUMNS} FROM tokens WHERE token_prefix = ? AND revoked = 0"
        ))
        .bind(token_prefix(presented))
        .fetch_all(pool)
        .await?;

        let now = Utc::now();
        for candidate in candidates {
            if hasher
                .verify_async(presented.to_string(), candidate.token_hash.clone())
                .await
            {
                if candidate.is_expired(now) {
                    tracing::debug!(token_id = candidate.id, "Presented token has expired");
                    return Ok(None);
                }
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Finds a token by ID
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Token>(&format!("SELECT {COLUMNS} FROM tokens WHERE id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists tokens, newest first, optionally only those of one user
    pub async fn list(
        pool: &SqlitePool,
        user_id: Option<i64>,
        request: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tokens");
        push_filters(&mut count, user_id);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM tokens"));
        push_filters(&mut select, user_id);
        select.push(" ORDER BY id DESC");
        request.push_limit(&mut select);
        let items = select.build_query_as::<Token>().fetch_all(pool).await?;

        Ok(Page::new(items, request, total))
    }

    /// Revokes a token
    ///
    /// Idempotent: revoking twice succeeds and keeps the first
    /// `revoked_at`. Returns `false` only if the token does not exist.
    pub async fn revoke<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE tokens SET revoked = 1, revoked_at = COALESCE(revoked_at, ?) WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether the token is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Usable iff not revoked and not expired
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }

    pub fn scope_list(&self) -> Vec<String> {
        parse_scopes(&self.scopes)
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, user_id: Option<i64>) {
    let mut clause = Where::new();
    if let Some(user_id) = user_id {
        clause.and(builder).push("user_id = ").push_bind(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::models::testing::{pool, user};
    use crate::models::user::Role;

    fn hasher() -> Hasher {
        Hasher::new(PasswordConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_issue_rejects_unrepresentable_expiry() {
        let pool = pool().await;
        let owner = user(&pool, "far@example.com", Role::User).await;

        let result = Token::issue(
            &pool,
            &hasher(),
            IssueToken {
                user_id: owner.id,
                ttl: Some(Duration::seconds(1_000_000_000_000_000)),
                scopes: vec![],
            },
        )
        .await;
        assert!(matches!(result, Err(TokenError::LifetimeOutOfRange)));

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_issue_stores_only_prefix_and_digest() {
        let pool = pool().await;
        let hasher = hasher();
        let owner = user(&pool, "t@example.com", Role::User).await;

        let (token, plaintext) = Token::issue(
            &pool,
            &hasher,
            IssueToken {
                user_id: owner.id,
                ttl: None,
                scopes: vec!["accounts:read".to_string()],
            },
        )
        .await
        .unwrap();

        assert_eq!(plaintext.len(), 43);
        assert_eq!(token.token_prefix, &plaintext[..8]);
        assert_ne!(token.token_hash, plaintext);
        assert!(token.token_hash.starts_with("$argon2id$"));
        assert!(token.expires_at.is_none());
        assert_eq!(token.scope_list(), vec!["accounts:read"]);

        let stored: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tokens WHERE token_hash = ? OR scopes LIKE ?",
        )
        .bind(&plaintext)
        .bind(format!("%{}%", plaintext))
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stored, 0);

        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("token_hash").is_none());
    }

    #[tokio::test]
    async fn test_verify() {
        let pool = pool().await;
        let hasher = hasher();
        let owner = user(&pool, "v@example.com", Role::User).await;

        let (token, plaintext) = Token::issue(
            &pool,
            &hasher,
            IssueToken {
                user_id: owner.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let found = Token::verify(&pool, &hasher, &plaintext).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(token.id));

        // Same prefix, different secret
        let forged = format!("{}{}", &plaintext[..8], "x".repeat(35));
        assert!(Token::verify(&pool, &hasher, &forged).await.unwrap().is_none());

        assert!(Token::verify(&pool, &hasher, "unknownprefix-value")
            .await
            .unwrap()
            .is_none());
        assert!(Token::verify(&pool, &hasher, "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_rejects_expired() {
        let pool = pool().await;
        let hasher = hasher();
        let owner = user(&pool, "e@example.com", Role::User).await;

        let (_, plaintext) = Token::issue(
            &pool,
            &hasher,
            IssueToken {
                user_id: owner.id,
                ttl: Some(Duration::seconds(-1)),
                scopes: Vec::new(),
            },
        )
        .await
        .unwrap();

        assert!(Token::verify(&pool, &hasher, &plaintext).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let pool = pool().await;
        let hasher = hasher();
        let owner = user(&pool, "r@example.com", Role::User).await;

        let (token, plaintext) = Token::issue(
            &pool,
            &hasher,
            IssueToken {
                user_id: owner.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(Token::revoke(&pool, token.id).await.unwrap());
        let first = Token::find_by_id(&pool, token.id).await.unwrap().unwrap();
        assert!(first.revoked);
        assert!(first.revoked_at.is_some());

        assert!(Token::revoke(&pool, token.id).await.unwrap());
        let second = Token::find_by_id(&pool, token.id).await.unwrap().unwrap();
        assert_eq!(first.revoked_at, second.revoked_at);

        assert!(Token::verify(&pool, &hasher, &plaintext).await.unwrap().is_none());
        assert!(!Token::revoke(&pool, 9999).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let pool = pool().await;
        let hasher = hasher();
        let alice = user(&pool, "alice@example.com", Role::User).await;
        let bob = user(&pool, "bob@example.com", Role::Admin).await;

        for owner in [alice.id, alice.id, bob.id] {
            Token::issue(
                &pool,
                &hasher,
                IssueToken {
                    user_id: owner,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let mine = Token::list(&pool, Some(alice.id), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.total, 2);
        assert!(mine.items.iter().all(|t| t.user_id == alice.id));

        let all = Token::list(&pool, None, &PageRequest::default()).await.unwrap();
        assert_eq!(all.total, 3);
    }

    #[test]
    fn test_validity() {
        let now = Utc::now();
        let mut token = Token {
            id: 1,
            user_id: 1,
            token_prefix: "abcdefgh".to_string(),
            token_hash: String::new(),
            scopes: String::new(),
            created_at: now,
            expires_at: Some(now + Duration::seconds(1)),
            revoked: false,
            revoked_at: None,
        };
        assert!(token.is_valid(now));
        assert!(!token.is_valid(now + Duration::seconds(2)));

        token.expires_at = None;
        token.revoked = true;
        assert!(!token.is_valid(now));
    }
}
