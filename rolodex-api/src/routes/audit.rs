/// Audit trail endpoint
///
/// `GET /audit?limit=N` returns the newest N events (default 50, at most
/// 500), newest first. Elevated roles only.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use rolodex_shared::{
    audit::AuditEvent,
    auth::{
        identity::Identity,
        policy::{authorize, Action, Resource},
    },
};
use serde::Deserialize;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn recent_events(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    authorize(&identity, Resource::Audit, Action::List)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.audit.recent(limit).await))
}
