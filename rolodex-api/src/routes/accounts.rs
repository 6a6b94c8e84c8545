/// Account endpoints
///
/// # Endpoints
///
/// - `GET /accounts?q=&page=&per_page=` - Search accounts by name
/// - `POST /accounts` - Create account
/// - `GET /accounts/:id` - Get account
/// - `PUT /accounts/:id` - Replace account fields
/// - `DELETE /accounts/:id` - Delete account with its contacts and opportunities
/// - `GET /accounts/export?q=` - CSV export
/// - `POST /accounts/import` - CSV import (`text/csv` body)

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
use rolodex_shared::{
    auth::{
        identity::Identity,
        policy::{authorize, Action, Resource},
    },
    csv_io::{self, ImportReport, ACCOUNT_HEADER},
    models::{
        account::{Account, AccountData},
        page::{Page, PageRequest},
        user::User,
    },
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

/// Create and replace body
#[derive(Debug, Deserialize, Validate)]
pub struct AccountRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub industry: Option<String>,
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Website must be at most 500 characters"))]
    pub website: Option<String>,

    /// Defaults to the caller on create
    pub owner_id: Option<i64>,
}

impl AccountRequest {
    /// Normalizes and validates the body, checking that the owner exists
    async fn into_data(self, state: &AppState, default_owner: Option<i64>) -> ApiResult<AccountData> {
        let request = AccountRequest {
            name: self.name.trim().to_string(),
            ..self
        };
        request.validate()?;

        let owner_id = request.owner_id.or(default_owner);
        if let Some(owner_id) = owner_id {
            if User::find_by_id(&state.db, owner_id).await?.is_none() {
                return Err(ApiError::field("owner_id", "Owner does not exist"));
            }
        }

        Ok(AccountData {
            name: request.name,
            industry: non_blank(request.industry),
            phone: non_blank(request.phone),
            website: non_blank(request.website),
            owner_id,
        })
    }
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Account>>> {
    authorize(&identity, Resource::Accounts, Action::List)?;
    Ok(Json(Account::list(&state.db, &page).await?))
}

pub async fn create_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    authorize(&identity, Resource::Accounts, Action::Create)?;

    let data = req.into_data(&state, Some(identity.user_id)).await?;
    let account = Account::create(&state.db, data).await?;

    state
        .audit
        .record("account_created", Some(identity.user_id), json!({ "account_id": account.id, "name": account.name }))
        .await;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Account>> {
    authorize(&identity, Resource::Accounts, Action::Read)?;

    let account = Account::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
    Ok(Json(account))
}

/// Replaces every writable field; an absent field is cleared
pub async fn update_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<Json<Account>> {
    authorize(&identity, Resource::Accounts, Action::Update)?;

    let data = req.into_data(&state, None).await?;
    let account = Account::update(&state.db, id, data)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    state
        .audit
        .record("account_updated", Some(identity.user_id), json!({ "account_id": id }))
        .await;

    Ok(Json(account))
}

/// Deletes the account together with its contacts and opportunities
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    authorize(&identity, Resource::Accounts, Action::Delete)?;

    if !Account::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Account not found".to_string()));
    }

    state
        .audit
        .record("account_deleted", Some(identity.user_id), json!({ "account_id": id }))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_accounts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    authorize(&identity, Resource::Accounts, Action::Export)?;

    let rows = Account::export(&state.db, query.q.as_deref()).await?;
    let body = csv_io::write_csv(&ACCOUNT_HEADER, &rows)?;
    Ok(csv_attachment("accounts.csv", body))
}

pub async fn import_accounts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    authorize(&identity, Resource::Accounts, Action::Import)?;

    let report = csv_io::import_accounts(&state.db, &body).await?;

    state
        .audit
        .record(
            "accounts_imported",
            Some(identity.user_id),
            json!({ "created": report.created, "rejected": report.errors.len() }),
        )
        .await;

    Ok(Json(report))
}
