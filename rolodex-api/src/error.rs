/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>`; every typed error of the
/// shared crate converts into it with `?`.
///
/// # Example
///
/// ```
/// use rolodex_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("Account not found".to_string()));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rolodex_shared::{
    auth::{
        password::PasswordError,
        policy::AuthzError,
        reset::{ResetError, ResetTokenError},
        session::AuthError,
    },
    csv_io::CsvError,
    mail::MailError,
    models::token::TokenError,
};
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Message shown for every unusable password-reset link
pub const INVALID_RESET_LINK: &str = "This password reset link is invalid or has expired";

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Field validation errors (400)
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Service unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden(AuthzError::Forbidden.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert validator failures to field errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let message = db_err.message();
                    if message.contains("users.email") {
                        return ApiError::Conflict("Email already registered".to_string());
                    }
                    if message.contains("accounts.name") {
                        return ApiError::Conflict("An account with this name already exists".to_string());
                    }
                    return ApiError::Conflict("Record already exists".to_string());
                }
                if db_err.is_foreign_key_violation() {
                    return ApiError::BadRequest("Referenced record does not exist".to_string());
                }

                // Other database errors are internal
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert authentication errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Database(e) => e.into(),
            AuthError::Password(e) => e.into(),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Database(e) => e.into(),
            TokenError::Password(e) => e.into(),
            TokenError::LifetimeOutOfRange => ApiError::field("ttl_seconds", "ttl_seconds is out of range"),
        }
    }
}

/// Every unusable reset link reads the same to the client; the cause is logged
impl From<ResetTokenError> for ApiError {
    fn from(err: ResetTokenError) -> Self {
        match &err {
            ResetTokenError::Create(msg) => {
                return ApiError::InternalError(format!("Reset token creation failed: {}", msg));
            }
            ResetTokenError::Expired => tracing::info!("Password reset rejected: link expired"),
            ResetTokenError::InvalidSignature => {
                tracing::warn!("Password reset rejected: invalid signature")
            }
            other => tracing::warn!(reason = %other, "Password reset rejected"),
        }
        ApiError::BadRequest(INVALID_RESET_LINK.to_string())
    }
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::Token(e) => e.into(),
            ResetError::WeakPassword(msg) => ApiError::field("password", msg),
            ResetError::Database(e) => e.into(),
            ResetError::Password(e) => e.into(),
        }
    }
}

impl From<CsvError> for ApiError {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::Csv(e) => ApiError::BadRequest(format!("Invalid CSV: {}", e)),
            CsvError::Database(e) => e.into(),
            CsvError::Encoding(msg) => ApiError::InternalError(format!("CSV encoding failed: {}", msg)),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        tracing::warn!(error = %err, "Mail delivery failed");
        ApiError::ServiceUnavailable("Mail delivery failed".to_string())
    }
}
