/// User administration endpoints (elevated roles only)
///
/// # Endpoints
///
/// - `GET /users?q=&page=&per_page=` - Search users by email or name
/// - `POST /users` - Create user
/// - `GET /users/:id` - Get user
/// - `PUT /users/:id` - Update profile fields
/// - `DELETE /users/:id` - Delete user (not yourself)
/// - `POST /users/:id/role` - Change role, confirming your own password
/// - `POST /users/:id/reset-password` - Set a new password for a user
///
/// Only an `owner` may grant the `owner` role or act on an existing owner.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use rolodex_shared::{
    auth::{
        identity::Identity,
        password::validate_password_strength,
        policy::{authorize, Action, Resource},
    },
    models::{
        page::{Page, PageRequest},
        session::Session,
        user::{CreateUser, Role, UpdateUser, User},
    },
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,

    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,

    /// The acting user's own password
    pub current_password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminResetRequest {
    pub new_password: String,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

async fn find_user(state: &AppState, id: i64) -> ApiResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Owners are only managed by owners
fn guard_owner(identity: &Identity, target_role: Role) -> ApiResult<()> {
    if target_role == Role::Owner && identity.role != Role::Owner {
        return Err(ApiError::Forbidden("Only an owner can manage owners".to_string()));
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<User>>> {
    authorize(&identity, Resource::Users, Action::List)?;
    Ok(Json(User::list(&state.db, &page).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    authorize(&identity, Resource::Users, Action::Create)?;

    let req = CreateUserRequest {
        email: req.email.trim().to_string(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        ..req
    };
    req.validate()?;
    validate_password_strength(&req.password).map_err(|e| ApiError::field("password", e))?;
    guard_owner(&identity, req.role)?;

    let password_hash = state.hasher.hash_async(req.password).await?;
    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
        },
    )
    .await?;

    state
        .audit
        .record(
            "user_created",
            Some(identity.user_id),
            json!({ "user_id": user.id, "email": user.email, "role": user.role }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    authorize(&identity, Resource::Users, Action::Read)?;
    Ok(Json(find_user(&state, id).await?))
}

/// Updates profile fields; absent fields keep their value
pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    authorize(&identity, Resource::Users, Action::Update)?;

    let req = UpdateUserRequest {
        email: trimmed(req.email),
        first_name: trimmed(req.first_name),
        last_name: trimmed(req.last_name),
    };
    req.validate()?;

    let target = find_user(&state, id).await?;
    guard_owner(&identity, target.role)?;

    let user = User::update(
        &state.db,
        id,
        UpdateUser {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    state
        .audit
        .record("user_updated", Some(identity.user_id), json!({ "user_id": id }))
        .await;

    Ok(Json(user))
}

/// Deletes a user
///
/// Their accounts and opportunities become unowned, their sessions end and
/// their tokens are revoked.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    authorize(&identity, Resource::Users, Action::Delete)?;

    if id == identity.user_id {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    let target = find_user(&state, id).await?;
    guard_owner(&identity, target.role)?;

    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    state
        .audit
        .record("user_deleted", Some(identity.user_id), json!({ "user_id": id, "email": target.email }))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Changes a user's role
///
/// The caller must confirm their own password. A wrong password is
/// `403 Forbidden` and nothing changes.
pub async fn change_role(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<User>> {
    authorize(&identity, Resource::Users, Action::ChangeRole)?;

    if id == identity.user_id {
        return Err(ApiError::Forbidden("You cannot change your own role".to_string()));
    }

    let target = find_user(&state, id).await?;
    guard_owner(&identity, target.role)?;
    guard_owner(&identity, req.role)?;

    let actor = find_user(&state, identity.user_id).await?;
    if !state
        .hasher
        .verify_async(req.current_password, actor.password_hash)
        .await
    {
        tracing::warn!(actor_id = identity.user_id, target_id = id, "Role change step-up failed");
        return Err(ApiError::Forbidden("Password confirmation failed".to_string()));
    }

    let user = User::set_role(&state.db, id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    state
        .audit
        .record(
            "user_role_changed",
            Some(identity.user_id),
            json!({ "user_id": id, "from": target.role, "to": user.role }),
        )
        .await;

    Ok(Json(user))
}

/// Sets a new password for a user and ends their sessions
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<AdminResetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&identity, Resource::Users, Action::ResetPassword)?;

    let target = find_user(&state, id).await?;
    guard_owner(&identity, target.role)?;
    validate_password_strength(&req.new_password).map_err(|e| ApiError::field("new_password", e))?;

    let digest = state.hasher.hash_async(req.new_password).await?;

    let mut tx = state.db.begin().await?;
    User::set_password(&mut *tx, id, &digest).await?;
    let ended = Session::delete_for_user(&mut *tx, id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            "user_password_reset_by_admin",
            Some(identity.user_id),
            json!({ "user_id": id, "sessions_ended": ended }),
        )
        .await;

    Ok(Json(json!({ "message": "Password reset" })))
}
