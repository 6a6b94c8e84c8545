/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Login, logout, password change and reset
/// - `accounts`, `contacts`, `opportunities`: CRUD, search, CSV import/export
/// - `users`: User administration
/// - `tokens`: API token management
/// - `dashboard`: Landing-page summary
/// - `audit`: Recent audit events
/// - `admin`: Operational tools

pub mod accounts;
pub mod admin;
pub mod audit;
pub mod auth;
pub mod contacts;
pub mod dashboard;
pub mod health;
pub mod opportunities;
pub mod tokens;
pub mod users;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Query string of export endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub q: Option<String>,
}

/// `text/csv` attachment response
pub fn csv_attachment(filename: &str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Trims a free-text field; blank becomes `None`
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_attachment_headers() {
        let response = csv_attachment("accounts.csv", "name\n".to_string());
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"accounts.csv\""
        );
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ".to_string())), Some("x".to_string()));
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(None), None);
    }
}
