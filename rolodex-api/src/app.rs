/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use rolodex_api::{app::{build_router, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = rolodex_shared::db::connect(config.pool_config()).await?;
/// let state = AppState::from_config(pool, config)?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use rolodex_shared::{
    audit::AuditRecorder,
    auth::{password::Hasher, session::SessionConfig},
    mail::{LogMailer, MailMessage, Mailer, RelayMailer},
};
use sqlx::SqlitePool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{config::Config, middleware::{auth::require_identity, security::SecurityHeadersLayer}};

/// Shared application state
///
/// Built once in `main` and cloned into each handler via Axum's `State`
/// extractor. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Argon2id hasher for passwords and token secrets
    pub hasher: Hasher,

    pub audit: AuditRecorder,
    pub mailer: Arc<dyn Mailer>,
    pub session: SessionConfig,
}

impl AppState {
    /// Assembles state from explicit collaborators
    pub fn new(
        db: SqlitePool,
        config: Config,
        hasher: Hasher,
        audit: AuditRecorder,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let session = config.session_config();
        Self {
            db,
            config: Arc::new(config),
            hasher,
            audit,
            mailer,
            session,
        }
    }

    /// Builds state with the hasher, audit file and mailer the config names
    ///
    /// Mail goes to the relay when `MAIL_RELAY_URL` is set and to the log
    /// otherwise.
    pub fn from_config(db: SqlitePool, config: Config) -> anyhow::Result<Self> {
        let hasher = Hasher::new(config.security.password)?;
        let audit = AuditRecorder::new(&config.audit.path);
        let mailer: Arc<dyn Mailer> = match &config.mail.relay_url {
            Some(url) => Arc::new(RelayMailer::new(url.clone())?),
            None => Arc::new(LogMailer),
        };
        Ok(Self::new(db, config, hasher, audit, mailer))
    }

    /// Key for signing password-reset links
    pub fn secret_key(&self) -> &str {
        &self.config.security.secret_key
    }

    /// Message from the configured sender
    pub fn mail(&self, to: &str, subject: &str, body: String) -> MailMessage {
        MailMessage {
            from: self.config.mail.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                       # Health check (public)
/// ├── /auth/                        # login, logout, forgot/reset (public)
/// │   ├── POST /change-password     # (authenticated)
/// │   └── GET  /me                  # (authenticated)
/// ├── /dashboard
/// ├── /accounts, /contacts, /opportunities
/// │   ├── GET|POST /                # list, create
/// │   ├── GET /export, POST /import
/// │   └── GET|PUT|DELETE /:id
/// ├── /users                        # elevated only
/// │   ├── POST /:id/role            # step-up password required
/// │   └── POST /:id/reset-password
/// ├── /tokens                       # GET|POST, POST /:id/revoke
/// ├── /audit                        # elevated only
/// └── /admin/test-email             # elevated only
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (every route except health and the public auth routes)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password));

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/dashboard", get(routes::dashboard::dashboard))
        .route(
            "/accounts",
            get(routes::accounts::list_accounts).post(routes::accounts::create_account),
        )
        .route("/accounts/export", get(routes::accounts::export_accounts))
        .route("/accounts/import", post(routes::accounts::import_accounts))
        .route(
            "/accounts/:id",
            get(routes::accounts::get_account)
                .put(routes::accounts::update_account)
                .delete(routes::accounts::delete_account),
        )
        .route(
            "/contacts",
            get(routes::contacts::list_contacts).post(routes::contacts::create_contact),
        )
        .route("/contacts/export", get(routes::contacts::export_contacts))
        .route("/contacts/import", post(routes::contacts::import_contacts))
        .route(
            "/contacts/:id",
            get(routes::contacts::get_contact)
                .put(routes::contacts::update_contact)
                .delete(routes::contacts::delete_contact),
        )
        .route(
            "/opportunities",
            get(routes::opportunities::list_opportunities)
                .post(routes::opportunities::create_opportunity),
        )
        .route("/opportunities/export", get(routes::opportunities::export_opportunities))
        .route("/opportunities/import", post(routes::opportunities::import_opportunities))
        .route(
            "/opportunities/:id",
            get(routes::opportunities::get_opportunity)
                .put(routes::opportunities::update_opportunity)
                .delete(routes::opportunities::delete_opportunity),
        )
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        .route(
            "/users/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route("/users/:id/role", post(routes::users::change_role))
        .route("/users/:id/reset-password", post(routes::users::reset_password))
        .route("/tokens", get(routes::tokens::list_tokens).post(routes::tokens::create_token))
        .route("/tokens/:id/revoke", post(routes::tokens::revoke_token))
        .route("/audit", get(routes::audit::recent_events))
        .route("/admin/test-email", post(routes::admin::test_email))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
