/// Session authentication
///
/// Interactive login with email and password, cookie-backed sessions,
/// logout, and resolution of a presented cookie or bearer token into an
/// [`Identity`].
///
/// # Cookie
///
/// The session cookie `rolodex_session` carries 32 random bytes (URL-safe
/// base64). It is `HttpOnly`, `SameSite=Lax`, `Path=/`, optionally
/// `Secure`, and its `Max-Age` equals the idle lifetime. Every
/// authenticated request slides the server-side expiry forward.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::identity::Identity;
use super::password::{Hasher, PasswordError};
use crate::models::session::Session;
use crate::models::token::{Token, TokenError};
use crate::models::user::User;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "rolodex_session";

/// Default idle lifetime in seconds
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 3600;

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password; deliberately indistinguishable
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No valid credential was presented
    #[error("Authentication required")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Database(e) => AuthError::Database(e),
            TokenError::Password(e) => AuthError::Password(e),
        }
    }
}

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle lifetime
    pub lifetime: Duration,

    /// Whether to mark the cookie `Secure`
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS),
            cookie_secure: false,
        }
    }
}

impl SessionConfig {
    /// `Set-Cookie` value establishing a session
    pub fn cookie(&self, secret: &str) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            SESSION_COOKIE,
            secret,
            self.lifetime.num_seconds()
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE);
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct Login {
    pub user: User,
    pub identity: Identity,

    /// Cookie secret to hand to the browser
    pub secret: String,
}

/// Generates a fresh session secret
pub fn generate_session_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a session secret, as stored
pub fn hash_session_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extracts a cookie value from a `Cookie` request header
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::session::cookie_value;
///
/// let header = "theme=dark; rolodex_session=abc123";
/// assert_eq!(cookie_value(header, "rolodex_session"), Some("abc123"));
/// assert_eq!(cookie_value(header, "missing"), None);
/// ```
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Logs a user in with email and password
///
/// A missing user still costs one password verification against a dummy
/// digest, so response timing does not reveal which emails exist.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` for an unknown email or a wrong
/// password.
pub async fn login(
    pool: &SqlitePool,
    hasher: &Hasher,
    config: &SessionConfig,
    email: &str,
    password: &str,
) -> Result<Login, AuthError> {
    let user = match User::find_by_email(pool, email).await? {
        Some(user) => user,
        None => {
            hasher.verify_dummy_async(password.to_string()).await;
            tracing::info!("Login failed");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !hasher
        .verify_async(password.to_string(), user.password_hash.clone())
        .await
    {
        tracing::info!(user_id = user.id, "Login failed");
        return Err(AuthError::InvalidCredentials);
    }

    let secret = generate_session_secret();
    let session = Session::create(pool, user.id, &hash_session_secret(&secret), config.lifetime).await?;
    let identity = Identity::from_session(&user, session.id);

    tracing::info!(user_id = user.id, session_id = session.id, "User logged in");

    Ok(Login {
        user,
        identity,
        secret,
    })
}

/// Ends the session identified by a cookie secret
///
/// Idempotent. Returns the user whose session was removed, if there was one.
pub async fn logout(pool: &SqlitePool, secret: Option<&str>) -> Result<Option<i64>, sqlx::Error> {
    let Some(secret) = secret else {
        return Ok(None);
    };

    let user_id = Session::delete_by_hash(pool, &hash_session_secret(secret)).await?;
    if let Some(user_id) = user_id {
        tracing::info!(user_id, "User logged out");
    }
    Ok(user_id)
}

/// Resolves a session cookie secret into an identity
///
/// Slides the session expiry forward on success.
pub async fn authenticate_session(
    pool: &SqlitePool,
    config: &SessionConfig,
    secret: &str,
) -> Result<Option<Identity>, AuthError> {
    let now = Utc::now();
    let Some(session) = Session::find_active(pool, &hash_session_secret(secret), now).await? else {
        return Ok(None);
    };

    let Some(user) = User::find_by_id(pool, session.user_id).await? else {
        return Ok(None);
    };

    Session::touch(pool, session.id, config.lifetime).await?;

    Ok(Some(Identity::from_session(&user, session.id)))
}

/// Resolves a bearer token into an identity
///
/// `None` for unknown, revoked and expired tokens, and for tokens whose
/// user no longer exists.
pub async fn authenticate_token(
    pool: &SqlitePool,
    hasher: &Hasher,
    presented: &str,
) -> Result<Option<Identity>, AuthError> {
    let Some(token) = Token::verify(pool, hasher, presented).await? else {
        return Ok(None);
    };

    let Some(user) = User::find_by_id(pool, token.user_id).await? else {
        tracing::warn!(token_id = token.id, "Token belongs to a missing user");
        return Ok(None);
    };

    Ok(Some(Identity::from_token(&user, token.id, token.scope_list())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::models::testing::pool;
    use crate::models::token::IssueToken;
    use crate::models::user::{CreateUser, Role};

    fn hasher() -> Hasher {
        Hasher::new(PasswordConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    async fn seed(pool: &SqlitePool, hasher: &Hasher) -> User {
        User::create(
            pool,
            CreateUser {
                email: "login@example.com".to_string(),
                password_hash: hasher.hash("correct-horse-1").unwrap(),
                first_name: "Log".to_string(),
                last_name: "In".to_string(),
                role: Role::Sales,
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_cookie_format() {
        let config = SessionConfig::default();
        assert_eq!(
            config.cookie("abc"),
            "rolodex_session=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=3600"
        );

        let secure = SessionConfig {
            cookie_secure: true,
            ..Default::default()
        };
        assert!(secure.cookie("abc").ends_with("; Secure"));
        assert!(secure.clear_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_cookie_value_parsing() {
        assert_eq!(cookie_value("rolodex_session=x", SESSION_COOKIE), Some("x"));
        assert_eq!(cookie_value("a=1;rolodex_session=y ; b=2", SESSION_COOKIE), Some("y"));
        assert_eq!(cookie_value("rolodex_session=", SESSION_COOKIE), None);
        assert_eq!(cookie_value("xrolodex_session=z", SESSION_COOKIE), None);
    }

    #[test]
    fn test_session_secret_hashing() {
        let secret = generate_session_secret();
        assert_eq!(secret.len(), 43);
        assert_eq!(hash_session_secret(&secret).len(), 64);
        assert_eq!(hash_session_secret("x"), hash_session_secret("x"));
        assert_ne!(generate_session_secret(), secret);
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let pool = pool().await;
        let hasher = hasher();
        let config = SessionConfig::default();
        let user = seed(&pool, &hasher).await;

        let login = login(&pool, &hasher, &config, "login@example.com", "correct-horse-1")
            .await
            .unwrap();
        assert_eq!(login.user.id, user.id);
        assert!(login.identity.is_session());

        let identity = authenticate_session(&pool, &config, &login.secret)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.role, Role::Sales);

        assert!(authenticate_session(&pool, &config, "not-a-session")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let pool = pool().await;
        let hasher = hasher();
        let config = SessionConfig::default();
        seed(&pool, &hasher).await;

        let wrong_password = login(&pool, &hasher, &config, "login@example.com", "nope")
            .await
            .unwrap_err();
        let unknown_user = login(&pool, &hasher, &config, "ghost@example.com", "nope")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let pool = pool().await;
        let hasher = hasher();
        let config = SessionConfig::default();
        let user = seed(&pool, &hasher).await;

        let login = login(&pool, &hasher, &config, "login@example.com", "correct-horse-1")
            .await
            .unwrap();

        assert_eq!(logout(&pool, Some(&login.secret)).await.unwrap(), Some(user.id));
        assert_eq!(logout(&pool, Some(&login.secret)).await.unwrap(), None);
        assert_eq!(logout(&pool, None).await.unwrap(), None);
        assert!(authenticate_session(&pool, &config, &login.secret)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_authenticate_token() {
        let pool = pool().await;
        let hasher = hasher();
        let user = seed(&pool, &hasher).await;

        let (token, plaintext) = Token::issue(
            &pool,
            &hasher,
            IssueToken {
                user_id: user.id,
                ttl: None,
                scopes: vec!["accounts:read".to_string()],
            },
        )
        .await
        .unwrap();

        let identity = authenticate_token(&pool, &hasher, &plaintext)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.token_id, Some(token.id));
        assert_eq!(identity.scopes, Some(vec!["accounts:read".to_string()]));

        Token::revoke(&pool, token.id).await.unwrap();
        assert!(authenticate_token(&pool, &hasher, &plaintext)
            .await
            .unwrap()
            .is_none());
    }
}
