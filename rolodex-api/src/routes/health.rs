/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected"
/// }
/// ```
///
/// A failing database yields `503` with `status: "degraded"`.

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use rolodex_shared::db::pool;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database) = match pool::health_check(&state.db).await {
        Ok(()) => (StatusCode::OK, "connected"),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: if status == StatusCode::OK { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
        }),
    )
}
