//! Common test utilities for integration tests
//!
//! Every `TestContext` owns a private in-memory database and a temporary
//! audit file, so tests run in parallel without interfering.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use rolodex_api::{
    app::{build_router, AppState},
    config::Config,
};
use rolodex_shared::{
    audit::AuditRecorder,
    auth::password::Hasher,
    db::{self, pool::DatabaseConfig},
    mail::{MailError, MailMessage, Mailer},
    models::user::{CreateUser, Role, User},
};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET_KEY: &str = "integration-test-secret-key-0123456789";
pub const PASSWORD: &str = "password123";

/// Mailer that keeps every message
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<MailMessage>>>,
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// How a request authenticates
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Cookie(String),
    Bearer(String),
    Query(String),
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: SqlitePool,
    pub app: Router,
    pub state: AppState,
    pub mailer: RecordingMailer,
    _audit_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let config = Config::from_lookup(|key| match key {
            "SECRET_KEY" => Some(SECRET_KEY.to_string()),
            "PASSWORD_MEMORY_KIB" => Some("8".to_string()),
            "PASSWORD_ITERATIONS" => Some("1".to_string()),
            "PUBLIC_BASE_URL" => Some("http://crm.test".to_string()),
            _ => None,
        })
        .unwrap();

        let db = db::connect(DatabaseConfig::in_memory()).await.unwrap();
        let audit_dir = tempfile::tempdir().unwrap();
        let audit = AuditRecorder::new(audit_dir.path().join("audit.log"));
        let hasher = Hasher::new(config.security.password).unwrap();
        let mailer = RecordingMailer::default();

        let state = AppState::new(db.clone(), config, hasher, audit, Arc::new(mailer.clone()));
        let app = build_router(state.clone());

        TestContext {
            db,
            app,
            state,
            mailer,
            _audit_dir: audit_dir,
        }
    }

    /// Creates a user whose password is [`PASSWORD`]
    pub async fn user(&self, email: &str, role: Role) -> User {
        let password_hash = self.state.hasher.hash(PASSWORD).unwrap();
        User::create(
            &self.db,
            CreateUser {
                email: email.to_string(),
                password_hash,
                first_name: "Test".to_string(),
                last_name: email.split('@').next().unwrap_or("user").to_string(),
                role,
            },
        )
        .await
        .unwrap()
    }

    /// Sends a request through the router
    pub async fn send(&self, method: &str, uri: &str, auth: &Auth, body: Body, content_type: Option<&str>) -> Response {
        let uri = match auth {
            Auth::Query(token) => {
                let sep = if uri.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", uri, sep, token)
            }
            _ => uri.to_string(),
        };

        let mut builder = Request::builder().method(method).uri(uri);
        match auth {
            Auth::Cookie(cookie) => builder = builder.header(header::COOKIE, cookie),
            Auth::Bearer(token) => builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            Auth::None | Auth::Query(_) => {}
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    /// JSON request returning status and parsed body (`Null` when empty)
    pub async fn json(&self, method: &str, uri: &str, auth: &Auth, body: Option<Value>) -> (StatusCode, Value) {
        let response = match body {
            Some(body) => {
                self.send(method, uri, auth, Body::from(body.to_string()), Some("application/json"))
                    .await
            }
            None => self.send(method, uri, auth, Body::empty(), None).await,
        };
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str, auth: &Auth) -> (StatusCode, Value) {
        self.json("GET", uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: &Auth, body: Value) -> (StatusCode, Value) {
        self.json("POST", uri, auth, Some(body)).await
    }

    /// Logs in and returns the `Cookie` header value for the session
    pub async fn login(&self, email: &str, password: &str) -> Auth {
        let response = self
            .send(
                "POST",
                "/auth/login",
                &Auth::None,
                Body::from(serde_json::json!({ "email": email, "password": password }).to_string()),
                Some("application/json"),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login failed for {}", email);
        Auth::Cookie(session_cookie(&response).expect("session cookie"))
    }

    /// Issues a token through the API for a logged-in session
    pub async fn token(&self, session: &Auth, body: Value) -> String {
        let (status, json) = self.post("/tokens", session, body).await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["token"].as_str().unwrap().to_string()
    }

    pub async fn account(&self, auth: &Auth, name: &str) -> i64 {
        let (status, json) = self
            .post("/accounts", auth, serde_json::json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["id"].as_i64().unwrap()
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        self.state
            .audit
            .recent(1000)
            .await
            .into_iter()
            .map(|event| event.action)
            .collect()
    }
}

/// `name=value` of the session cookie set by a response
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("rolodex_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
