/// Signed password-reset tokens
///
/// A reset link carries an HS256-signed payload:
///
/// - `sub`: user ID
/// - `purpose`: always `password_reset`
/// - `fp`: fingerprint of the user's current password digest
/// - `iat` / `exp`: issued-at and expiry, one hour apart
///
/// The fingerprint makes each link single-use: once the password changes,
/// the digest changes and every outstanding link stops matching.
///
/// Expired and tampered tokens fail with distinct errors so they can be
/// logged apart; callers present both to users as one generic message.
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::reset::{decode_reset_token, mint_reset_token};
///
/// let secret = "a-secret-key-that-is-at-least-32-characters";
/// let token = mint_reset_token(42, "$argon2id$digest", secret).unwrap();
///
/// let claims = decode_reset_token(&token, secret).unwrap();
/// assert_eq!(claims.user_id().unwrap(), 42);
/// assert!(claims.matches_password("$argon2id$digest"));
/// ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::password::{validate_password_strength, Hasher, PasswordError};
use crate::models::session::Session;
use crate::models::user::User;

/// Purpose tag carried in every reset token
pub const RESET_PURPOSE: &str = "password_reset";

/// Issuer claim
const ISSUER: &str = "rolodex";

/// How long a reset link stays valid
pub fn reset_token_lifetime() -> Duration {
    Duration::hours(1)
}

/// Error type for reset token handling
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResetTokenError {
    #[error("Reset token has expired")]
    Expired,

    #[error("Reset token signature is invalid")]
    InvalidSignature,

    #[error("Reset token is malformed: {0}")]
    Malformed(String),

    #[error("Token is not a password reset token")]
    WrongPurpose,

    /// The password changed since the token was minted
    #[error("Reset token has already been used")]
    AlreadyUsed,

    #[error("Failed to create reset token: {0}")]
    Create(String),
}

/// Reset token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetClaims {
    pub sub: String,
    pub purpose: String,
    pub fp: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl ResetClaims {
    /// Parses the user ID from `sub`
    pub fn user_id(&self) -> Result<i64, ResetTokenError> {
        self.sub
            .parse()
            .map_err(|_| ResetTokenError::Malformed("subject is not a user id".to_string()))
    }

    /// Whether the fingerprint matches a password digest
    pub fn matches_password(&self, password_hash: &str) -> bool {
        let expected = password_fingerprint(password_hash);
        let (a, b) = (expected.as_bytes(), self.fp.as_bytes());
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

/// Short fingerprint of a password digest
///
/// First 16 hex characters of its SHA-256.
pub fn password_fingerprint(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    hex::encode(&digest[..8])
}

/// Mints a reset token valid for one hour from now
pub fn mint_reset_token(user_id: i64, password_hash: &str, secret: &str) -> Result<String, ResetTokenError> {
    mint_reset_token_at(user_id, password_hash, secret, Utc::now())
}

/// Mints a reset token as if issued at `issued_at`
pub fn mint_reset_token_at(
    user_id: i64,
    password_hash: &str,
    secret: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, ResetTokenError> {
    let claims = ResetClaims {
        sub: user_id.to_string(),
        purpose: RESET_PURPOSE.to_string(),
        fp: password_fingerprint(password_hash),
        iss: ISSUER.to_string(),
        iat: issued_at.timestamp(),
        exp: (issued_at + reset_token_lifetime()).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ResetTokenError::Create(e.to_string()))
}

/// Verifies signature, expiry and purpose of a reset token
///
/// # Errors
///
/// - `ResetTokenError::Expired` past `exp` (no leeway)
/// - `ResetTokenError::InvalidSignature` if the signature does not verify
/// - `ResetTokenError::WrongPurpose` for any other signed payload
/// - `ResetTokenError::Malformed` for anything that is not a token
pub fn decode_reset_token(token: &str, secret: &str) -> Result<ResetClaims, ResetTokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let data = decode::<ResetClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ResetTokenError::Expired,
            ErrorKind::InvalidSignature => ResetTokenError::InvalidSignature,
            _ => ResetTokenError::Malformed(e.to_string()),
        })?;

    if data.claims.purpose != RESET_PURPOSE {
        return Err(ResetTokenError::WrongPurpose);
    }

    Ok(data.claims)
}

/// Builds the link mailed to the user
pub fn reset_link(public_base_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        public_base_url.trim_end_matches('/'),
        token
    )
}

/// Error type for completing a reset
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Token(#[from] ResetTokenError),

    #[error("{0}")]
    WeakPassword(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Redeems a reset token and sets a new password
///
/// Runs in one transaction: the password is replaced and every session of
/// the user is ended.
///
/// # Returns
///
/// The user whose password was reset
pub async fn complete_reset(
    pool: &SqlitePool,
    hasher: &Hasher,
    secret: &str,
    token: &str,
    new_password: &str,
) -> Result<User, ResetError> {
    let claims = decode_reset_token(token, secret)?;
    let user_id = claims.user_id()?;

    validate_password_strength(new_password).map_err(ResetError::WeakPassword)?;

    let user = User::find_by_id(pool, user_id)
        .await?
        .ok_or(ResetTokenError::AlreadyUsed)?;
    if !claims.matches_password(&user.password_hash) {
        return Err(ResetTokenError::AlreadyUsed.into());
    }

    let digest = hasher.hash_async(new_password.to_string()).await?;

    // The digest the link was checked against must still be in place
    let mut tx = pool.begin().await?;
    if !User::replace_password(&mut *tx, user.id, &user.password_hash, &digest).await? {
        return Err(ResetTokenError::AlreadyUsed.into());
    }
    Session::delete_for_user(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "Password reset completed");
    Ok(user)
}
