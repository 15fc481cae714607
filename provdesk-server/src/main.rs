//! Provdesk Backend
//!
//! IT-provisioning workflow service: dynamic request forms, temp-account
//! pool tracking, mailbox permissions, and a live admin dashboard feed.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use provdesk_server::{routes, AppState, Config, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provdesk_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!(?config, "Loaded configuration");

    // Open the database
    let store = SqliteStore::open(&config.database)?;
    tracing::info!(database = %config.database, "Database ready");

    // Create app state
    let state = Arc::new(AppState::new(store));

    // Create router
    let app = routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("provdesk listening on http://{}", addr);
    tracing::info!("Dashboard event feed at ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
