/// Contact endpoints
///
/// # Endpoints
///
/// - `GET /contacts?q=&page=&per_page=` - Search by name, email or company
/// - `POST /contacts` - Create contact
/// - `GET /contacts/:id` - Get contact
/// - `PUT /contacts/:id` - Replace contact fields
/// - `DELETE /contacts/:id` - Delete contact
/// - `GET /contacts/export?q=` - CSV export
/// - `POST /contacts/import` - CSV import (`text/csv` body)

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
    csv_io::{self, ImportReport, CONTACT_HEADER},
    models::{
        account::Account,
        contact::{Contact, ContactData},
        page::{Page, PageRequest},
    },
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    pub last_name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub account_id: i64,
}

impl ContactRequest {
    async fn into_data(self, state: &AppState) -> ApiResult<ContactData> {
        let request = ContactRequest {
            first_name: self.first_name.trim().to_string(),
            email: non_blank(self.email),
            ..self
        };
        request.validate()?;

        if Account::find_by_id(&state.db, request.account_id).await?.is_none() {
            return Err(ApiError::field("account_id", "Account does not exist"));
        }

        Ok(ContactData {
            first_name: request.first_name,
            last_name: non_blank(request.last_name),
            email: request.email,
            phone: non_blank(request.phone),
            role_title: non_blank(request.role_title),
            account_id: request.account_id,
        })
    }
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Contact>>> {
    authorize(&identity, Resource::Contacts, Action::List)?;
    Ok(Json(Contact::list(&state.db, &page).await?))
}

pub async fn create_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    authorize(&identity, Resource::Contacts, Action::Create)?;

    let data = req.into_data(&state).await?;
    let contact = Contact::create(&state.db, data).await?;

    state
        .audit
        .record(
            "contact_created",
            Some(identity.user_id),
            json!({ "contact_id": contact.id, "account_id": contact.account_id }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn get_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Contact>> {
    authorize(&identity, Resource::Contacts, Action::Read)?;

    let contact = Contact::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Contact not found".to_string()))?;
    Ok(Json(contact))
}

pub async fn update_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<Json<Contact>> {
    authorize(&identity, Resource::Contacts, Action::Update)?;

    let data = req.into_data(&state).await?;
    let contact = Contact::update(&state.db, id, data)
        .await?
        .ok_or_else(|| ApiError::NotFound("Contact not found".to_string()))?;

    state
        .audit
        .record("contact_updated", Some(identity.user_id), json!({ "contact_id": id }))
        .await;

    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    authorize(&identity, Resource::Contacts, Action::Delete)?;

    if !Contact::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Contact not found".to_string()));
    }

    state
        .audit
        .record("contact_deleted", Some(identity.user_id), json!({ "contact_id": id }))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_contacts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    authorize(&identity, Resource::Contacts, Action::Export)?;

    let rows = Contact::export(&state.db, query.q.as_deref()).await?;
    let body = csv_io::write_csv(&CONTACT_HEADER, &rows)?;
    Ok(csv_attachment("contacts.csv", body))
}

pub async fn import_contacts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    authorize(&identity, Resource::Contacts, Action::Import)?;

    let report = csv_io::import_contacts(&state.db, &body).await?;

    state
        .audit
        .record(
            "contacts_imported",
            Some(identity.user_id),
            json!({ "created": report.created, "rejected": report.errors.len() }),
        )
        .await;

    Ok(Json(report))
}
