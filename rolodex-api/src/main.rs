//! # Rolodex API Server
//!
//! JSON HTTP API for the Rolodex CRM: accounts, contacts, opportunities,
//! users and API tokens, with session and bearer-token authentication.
//!
//! ## Usage
//!
//! ```bash
//! SECRET_KEY=$(openssl rand -hex 32) cargo run -p rolodex-api
//! ```

use rolodex_api::{
    app::{build_router, AppState},
    bootstrap,
    config::Config,
};
use rolodex_shared::db::{self, pool::close_pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rolodex_api=debug,rolodex_shared=debug,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before RUST_LOG and LOG_FORMAT are read
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Rolodex API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    let pool = db::connect(config.pool_config()).await?;
    let bootstrap_admin = config.bootstrap.clone();
    let state = AppState::from_config(pool.clone(), config)?;

    if let Some(admin) = bootstrap_admin {
        bootstrap::ensure_owner(&state, &admin).await?;
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received, exiting...");
        })
        .await?;

    close_pool(pool).await;
    Ok(())
}
