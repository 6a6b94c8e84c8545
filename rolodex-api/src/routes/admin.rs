/// Operational endpoints (elevated roles only)
///
/// `POST /admin/test-email` sends a test message, to the caller unless a
/// `to` address is given. Unlike other mail, a delivery failure is reported
/// to the caller as `503`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use rolodex_shared::{
    auth::{
        identity::Identity,
        policy::{authorize, Action, Resource},
    },
    models::user::User,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct TestEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub to: Option<String>,
}

pub async fn test_email(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Option<Json<TestEmailRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&identity, Resource::Mail, Action::SendMail)?;

    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;

    let to = match req.to {
        Some(to) => to,
        None => {
            User::find_by_id(&state.db, identity.user_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?
                .email
        }
    };

    let message = state.mail(
        &to,
        "Rolodex test email",
        "This is a test message from Rolodex. Mail delivery is working.".to_string(),
    );
    state.mailer.send(&message).await?;

    state
        .audit
        .record("test_email_sent", Some(identity.user_id), json!({ "to": to }))
        .await;

    Ok(Json(json!({ "sent": true, "to": to })))
}
