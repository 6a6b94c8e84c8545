//! First-run owner account
//!
//! When `BOOTSTRAP_ADMIN_EMAIL` and `BOOTSTRAP_ADMIN_PASSWORD` are set and
//! the database has no users, an `owner` account is created at startup.

use rolodex_shared::{
    auth::password::validate_password_strength,
    models::user::{CreateUser, Role, User},
};
use serde_json::json;

use crate::{app::AppState, config::BootstrapAdmin};

/// Creates the first owner if no users exist
///
/// # Returns
///
/// The created user, or `None` when users already exist
///
/// # Errors
///
/// Returns an error if the configured password is too weak or the insert
/// fails.
pub async fn ensure_owner(state: &AppState, admin: &BootstrapAdmin) -> anyhow::Result<Option<User>> {
    if User::count(&state.db).await? > 0 {
        tracing::debug!("Users exist, skipping bootstrap");
        return Ok(None);
    }

    validate_password_strength(&admin.password)
        .map_err(|e| anyhow::anyhow!("BOOTSTRAP_ADMIN_PASSWORD rejected: {}", e))?;

    let password_hash = state.hasher.hash_async(admin.password.clone()).await?;
    let user = User::create(
        &state.db,
        CreateUser {
            email: admin.email.trim().to_string(),
            password_hash,
            first_name: "Rolodex".to_string(),
            last_name: "Owner".to_string(),
            role: Role::Owner,
        },
    )
    .await?;

    state
        .audit
        .record("user_created", None, json!({ "user_id": user.id, "email": user.email, "role": user.role, "bootstrap": true }))
        .await;
    tracing::info!(user_id = user.id, email = %user.email, "Bootstrapped owner account");

    Ok(Some(user))
}
