/// API token management endpoints
///
/// # Endpoints
///
/// - `GET /tokens` - List tokens (own tokens; all tokens for elevated roles)
/// - `POST /tokens` - Issue a token (session login required)
/// - `POST /tokens/:id/revoke` - Revoke a token (idempotent)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use rolodex_shared::{
    auth::{
        identity::Identity,
        policy::{authorize, authorize_record, Action, Resource, RowScope},
        token::{parse_scopes, MAX_TTL_SECS},
    },
    models::{
        page::{Page, PageRequest},
        token::{IssueToken, Token},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Issue token request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateTokenRequest {
    /// Token owner; defaults to the caller. Elevated roles only for others.
    pub user_id: Option<i64>,

    /// Lifetime in seconds; the token never expires when absent
    #[validate(range(min = 1, max = 315360000, message = "ttl_seconds must be between 1 and 315360000"))]
    pub ttl_seconds: Option<i64>,

    /// Comma-separated scopes (e.g., "accounts:read,contacts:*")
    ///
    /// Empty grants the owner's full rights.
    pub scopes: Option<String>,
}

/// Issue token response
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub id: i64,

    /// The plaintext token (ONLY returned on creation)
    pub token: String,

    pub token_prefix: String,
    pub user_id: i64,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Token>>> {
    let scope = authorize(&identity, Resource::Tokens, Action::List)?;
    Ok(Json(Token::list(&state.db, scope.owner_filter(), &page).await?))
}

/// Issues a token
///
/// Only session logins may issue tokens. The plaintext is in the response
/// and cannot be retrieved again.
pub async fn create_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateTokenRequest>,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let scope = authorize(&identity, Resource::Tokens, Action::Create)?;
    req.validate()?;

    let user_id = req.user_id.unwrap_or(identity.user_id);
    if !scope.permits(Some(user_id)) {
        return Err(ApiError::forbidden());
    }
    if User::find_by_id(&state.db, user_id).await?.is_none() {
        return Err(ApiError::field("user_id", "User does not exist"));
    }

    let (token, plaintext) = Token::issue(
        &state.db,
        &state.hasher,
        IssueToken {
            user_id,
            ttl: req.ttl_seconds.map(token_lifetime).transpose()?,
            scopes: parse_scopes(req.scopes.as_deref().unwrap_or_default()),
        },
    )
    .await?;

    state
        .audit
        .record(
            "token_issued",
            Some(identity.user_id),
            json!({ "token_id": token.id, "user_id": user_id, "token_prefix": token.token_prefix }),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            id: token.id,
            token: plaintext,
            scopes: token.scope_list(),
            token_prefix: token.token_prefix,
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
        }),
    ))
}

/// Converts a requested lifetime, rejecting values beyond [`MAX_TTL_SECS`]
fn token_lifetime(seconds: i64) -> ApiResult<Duration> {
    if !(1..=MAX_TTL_SECS).contains(&seconds) {
        return Err(ApiError::field("ttl_seconds", "ttl_seconds is out of range"));
    }
    Duration::try_seconds(seconds).ok_or_else(|| ApiError::field("ttl_seconds", "ttl_seconds is out of range"))
}

/// Revokes a token; revoking an already revoked token succeeds
///
/// Standard callers get `403` for tokens that are not theirs, whether or
/// not the ID exists.
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let scope = authorize(&identity, Resource::Tokens, Action::Revoke)?;

    // Restricted callers see the same answer for missing and foreign tokens
    let token = match Token::find_by_id(&state.db, id).await? {
        Some(token) => token,
        None if scope == RowScope::All => return Err(ApiError::NotFound("Token not found".to_string())),
        None => return Err(ApiError::forbidden()),
    };

    authorize_record(&identity, Resource::Tokens, Action::Revoke, Some(token.user_id))?;

    Token::revoke(&state.db, id).await?;

    state
        .audit
        .record(
            "token_revoked",
            Some(identity.user_id),
            json!({ "token_id": id, "user_id": token.user_id, "already_revoked": token.revoked }),
        )
        .await;

    Ok(Json(json!({ "id": id, "revoked": true })))
}
