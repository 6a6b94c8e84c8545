/// Authentication middleware
///
/// Resolves the caller into an [`Identity`] and stores it in the request
/// extensions, where handlers pick it up with `Extension<Identity>`.
///
/// Resolution order:
/// 1. `Authorization: Bearer <token>` header
/// 2. `token` query parameter
/// 3. `rolodex_session` cookie
///
/// A presented bearer value that does not verify is rejected outright; the
/// cookie is not consulted in that case. Session requests get a refreshed
/// cookie so the browser-side lifetime slides with the server-side one.

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rolodex_shared::auth::{
    session::{self, SESSION_COOKIE},
    token::bearer_value,
};
use serde::Deserialize;

use crate::{app::AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query = Query::<TokenQuery>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();

    if let Some(presented) = bearer_value(authorization.as_deref(), query.token.as_deref()) {
        let identity = session::authenticate_token(&state.db, &state.hasher, presented)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        tracing::debug!(user_id = identity.user_id, token_id = ?identity.token_id, "Token authenticated");
        req.extensions_mut().insert(identity);
        return Ok(next.run(req).await);
    }

    let secret = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| session::cookie_value(cookies, SESSION_COOKIE))
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let identity = session::authenticate_session(&state.db, &state.session, &secret)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session expired".to_string()))?;

    tracing::debug!(user_id = identity.user_id, session_id = ?identity.session_id, "Session authenticated");
    req.extensions_mut().insert(identity);

    let mut response = next.run(req).await;
    // Logout clears the cookie itself
    if !response.headers().contains_key(header::SET_COOKIE) {
        if let Ok(cookie) = HeaderValue::from_str(&state.session.cookie(&secret)) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}
