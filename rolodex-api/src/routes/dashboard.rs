/// Dashboard endpoint
///
/// `GET /dashboard` returns the newest accounts, the open opportunities
/// closing soonest and headline counts. Opportunity figures cover only the
/// caller's own deals for standard roles.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use rolodex_shared::{
    auth::{
        identity::Identity,
        policy::{authorize, Action, Resource},
    },
    models::{
        account::Account,
        contact::Contact,
        opportunity::{Opportunity, PipelineSummary},
    },
};
use serde::Serialize;

/// Rows per dashboard panel
const PANEL_SIZE: i64 = 5;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub recent_accounts: Vec<Account>,
    pub upcoming_opportunities: Vec<Opportunity>,
    pub account_count: i64,
    pub contact_count: i64,
    pub pipeline: PipelineSummary,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<DashboardResponse>> {
    authorize(&identity, Resource::Accounts, Action::List)?;
    let scope = authorize(&identity, Resource::Opportunities, Action::List)?;
    let owner = scope.owner_filter();

    Ok(Json(DashboardResponse {
        recent_accounts: Account::recent(&state.db, PANEL_SIZE).await?,
        upcoming_opportunities: Opportunity::open_soonest(&state.db, owner, PANEL_SIZE).await?,
        account_count: Account::count(&state.db).await?,
        contact_count: Contact::count(&state.db).await?,
        pipeline: Opportunity::pipeline(&state.db, owner).await?,
    }))
}
