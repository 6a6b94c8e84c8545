/// Opportunity endpoints
///
/// Standard users only ever see and touch opportunities they own. Lists and
/// exports filter by owner in the query itself; single-record routes check
/// the owner on every request.
///
/// # Endpoints
///
/// - `GET /opportunities?q=&page=&per_page=` - Search by name or account
/// - `POST /opportunities` - Create opportunity (owner defaults to caller)
/// - `GET /opportunities/:id` - Get opportunity
/// - `PUT /opportunities/:id` - Replace opportunity fields
/// - `DELETE /opportunities/:id` - Delete opportunity
/// - `GET /opportunities/export?q=` - CSV export
/// - `POST /opportunities/import` - CSV import (`text/csv` body)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{csv_attachment, non_blank, ExportQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::NaiveDate;
use rolodex_shared::{
    auth::{
        identity::Identity,
        policy::{authorize, authorize_record, Action, Resource, RowScope},
    },
    csv_io::{self, ImportReport, OPPORTUNITY_HEADER},
    models::{
        account::Account,
        opportunity::{Opportunity, OpportunityData},
        page::{Page, PageRequest},
        user::User,
    },
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct OpportunityRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    /// Free text; blank means `Prospecting`
    #[validate(length(max = 50, message = "Stage must be at most 50 characters"))]
    pub stage: Option<String>,

    #[validate(range(min = 0, message = "Value cannot be negative"))]
    pub value: Option<i64>,

    /// `YYYY-MM-DD`
    pub close_date: Option<NaiveDate>,

    pub account_id: i64,
    pub owner_id: Option<i64>,
}

impl OpportunityRequest {
    /// Normalizes and validates the body
    ///
    /// `owner` is the owner the record will have; it must exist and lie
    /// within `scope`.
    async fn into_data(self, state: &AppState, owner: i64, scope: RowScope) -> ApiResult<OpportunityData> {
        let request = OpportunityRequest {
            name: self.name.trim().to_string(),
            stage: non_blank(self.stage),
            ..self
        };
        request.validate()?;

        if !scope.permits(Some(owner)) {
            return Err(ApiError::forbidden());
        }
        if Account::find_by_id(&state.db, request.account_id).await?.is_none() {
            return Err(ApiError::field("account_id", "Account does not exist"));
        }
        if User::find_by_id(&state.db, owner).await?.is_none() {
            return Err(ApiError::field("owner_id", "Owner does not exist"));
        }

        Ok(OpportunityData {
            name: request.name,
            stage: request.stage,
            value: request.value,
            close_date: request.close_date,
            account_id: request.account_id,
            owner_id: Some(owner),
        })
    }
}

/// Loads a record and checks the caller may act on it
async fn load(state: &AppState, identity: &Identity, id: i64, action: Action) -> ApiResult<Opportunity> {
    authorize(identity, Resource::Opportunities, action)?;

    let opportunity = Opportunity::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Opportunity not found".to_string()))?;

    authorize_record(identity, Resource::Opportunities, action, opportunity.owner_id)?;
    Ok(opportunity)
}

pub async fn list_opportunities(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Opportunity>>> {
    let scope = authorize(&identity, Resource::Opportunities, Action::List)?;
    Ok(Json(Opportunity::list(&state.db, &page, scope.owner_filter()).await?))
}

pub async fn create_opportunity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<OpportunityRequest>,
) -> ApiResult<(StatusCode, Json<Opportunity>)> {
    let scope = authorize(&identity, Resource::Opportunities, Action::Create)?;

    let owner = req.owner_id.unwrap_or(identity.user_id);
    let data = req.into_data(&state, owner, scope).await?;
    let opportunity = Opportunity::create(&state.db, data).await?;

    state
        .audit
        .record(
            "opportunity_created",
            Some(identity.user_id),
            json!({ "opportunity_id": opportunity.id, "owner_id": opportunity.owner_id }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(opportunity)))
}

pub async fn get_opportunity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Opportunity>> {
    Ok(Json(load(&state, &identity, id, Action::Read).await?))
}

/// Replaces every writable field
///
/// The owner stays unless `owner_id` is given.
pub async fn update_opportunity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<OpportunityRequest>,
) -> ApiResult<Json<Opportunity>> {
    let existing = load(&state, &identity, id, Action::Update).await?;
    let scope = authorize(&identity, Resource::Opportunities, Action::Update)?;

    let owner = req
        .owner_id
        .or(existing.owner_id)
        .unwrap_or(identity.user_id);
    let data = req.into_data(&state, owner, scope).await?;

    let opportunity = Opportunity::update(&state.db, id, data)
        .await?
        .ok_or_else(|| ApiError::NotFound("Opportunity not found".to_string()))?;

    state
        .audit
        .record("opportunity_updated", Some(identity.user_id), json!({ "opportunity_id": id }))
        .await;

    Ok(Json(opportunity))
}

pub async fn delete_opportunity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    load(&state, &identity, id, Action::Delete).await?;

    if !Opportunity::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Opportunity not found".to_string()));
    }

    state
        .audit
        .record("opportunity_deleted", Some(identity.user_id), json!({ "opportunity_id": id }))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_opportunities(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let scope = authorize(&identity, Resource::Opportunities, Action::Export)?;

    let rows = Opportunity::export(&state.db, query.q.as_deref(), scope.owner_filter()).await?;
    let body = csv_io::write_csv(&OPPORTUNITY_HEADER, &rows)?;
    Ok(csv_attachment("opportunities.csv", body))
}

pub async fn import_opportunities(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    let scope = authorize(&identity, Resource::Opportunities, Action::Import)?;

    let report = csv_io::import_opportunities(&state.db, &body, identity.user_id, scope).await?;

    state
        .audit
        .record(
            "opportunities_imported",
            Some(identity.user_id),
            json!({ "created": report.created, "rejected": report.errors.len() }),
        )
        .await;

    Ok(Json(report))
}
