/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /auth/login` - Start a session (sets the session cookie)
/// - `POST /auth/logout` - End the session (idempotent)
/// - `POST /auth/forgot-password` - Mail a password-reset link
/// - `POST /auth/reset-password` - Redeem a reset link
/// - `POST /auth/change-password` - Change own password (authenticated)
/// - `GET /auth/me` - Current identity (authenticated)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use rolodex_shared::{
    auth::{
        identity::{AuthMethod, Identity},
        password::validate_password_strength,
        reset,
        session::{self, AuthError, SESSION_COOKIE},
    },
    mail::send_best_effort,
    models::user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Response to a forgot-password request, whether or not the email exists
pub const RESET_REQUESTED: &str = "If that email is registered, a reset link has been sent";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub method: AuthMethod,
    pub scopes: Option<Vec<String>>,
}

/// Login with email and password
///
/// Unknown emails and wrong passwords produce the same `401` response.
///
/// # Endpoint
///
/// ```text
/// POST /auth/login
/// Content-Type: application/json
///
/// { "email": "ada@example.com", "password": "correct horse 1" }
/// ```
///
/// # Response
///
/// `200` with the user and a `Set-Cookie: rolodex_session=...` header.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let email = req.email.trim();

    let login = match session::login(&state.db, &state.hasher, &state.session, email, &req.password).await {
        Ok(login) => login,
        Err(AuthError::InvalidCredentials) => {
            state
                .audit
                .record("login_failed", None, json!({ "email": email }))
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }
        Err(e) => return Err(e.into()),
    };

    state
        .audit
        .record("login", Some(login.user.id), json!({ "session_id": login.identity.session_id }))
        .await;

    let cookie = HeaderValue::from_str(&state.session.cookie(&login.secret))
        .map_err(|e| ApiError::InternalError(format!("Invalid cookie value: {}", e)))?;

    let mut response = Json(LoginResponse { user: login.user }).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Ends the caller's session; succeeds without one
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let secret = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| session::cookie_value(cookies, SESSION_COOKIE));

    if let Some(user_id) = session::logout(&state.db, secret).await? {
        state.audit.record("logout", Some(user_id), json!({})).await;
    }

    let cookie = HeaderValue::from_str(&state.session.clear_cookie())
        .map_err(|e| ApiError::InternalError(format!("Invalid cookie value: {}", e)))?;

    let mut response = Json(json!({ "logged_out": true })).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Mails a reset link valid for one hour
///
/// The response is identical whether or not the email exists. Delivery
/// failures are logged together with the link.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;

    if let Some(user) = User::find_by_email(&state.db, req.email.trim()).await? {
        let token = reset::mint_reset_token(user.id, &user.password_hash, state.secret_key())?;
        let link = reset::reset_link(&state.config.api.public_base_url, &token);

        let message = state.mail(
            &user.email,
            "Reset your Rolodex password",
            format!(
                "Hello {},\n\nUse the link below within one hour to choose a new password:\n\n{}\n\n\
                 If you did not ask for this, ignore this message.",
                user.full_name(),
                link
            ),
        );
        send_best_effort(state.mailer.as_ref(), &message).await;

        state
            .audit
            .record("password_reset_requested", Some(user.id), json!({}))
            .await;
    } else {
        tracing::info!("Password reset requested for unknown email");
    }

    Ok(Json(json!({ "message": RESET_REQUESTED })))
}

/// Sets a new password from a reset link
///
/// Links that are expired, forged, or already used all fail with the same
/// message. All sessions of the user end.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;

    let user = reset::complete_reset(
        &state.db,
        &state.hasher,
        state.secret_key(),
        &req.token,
        &req.new_password,
    )
    .await?;

    state.audit.record("password_reset", Some(user.id), json!({})).await;

    Ok(Json(json!({ "message": "Password updated" })))
}

/// Changes the caller's password; requires the current one
pub async fn change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = User::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    if !state
        .hasher
        .verify_async(req.current_password, user.password_hash.clone())
        .await
    {
        return Err(ApiError::field("current_password", "Current password is incorrect"));
    }

    validate_password_strength(&req.new_password).map_err(|e| ApiError::field("new_password", e))?;

    let digest = state.hasher.hash_async(req.new_password).await?;
    User::set_password(&state.db, user.id, &digest).await?;

    state.audit.record("password_changed", Some(user.id), json!({})).await;

    Ok(Json(json!({ "message": "Password updated" })))
}

/// Current user and how the request was authenticated
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse {
        user,
        method: identity.method,
        scopes: identity.scopes,
    }))
}
