//! Society Hub API Server - Backend for residential society management
//!
//! Provides REST endpoints for:
//! - Society, resident, tenant and security onboarding
//! - Gate passes, service passes and animal tags verified by PIN
//! - Visitor attendance and deliveries at the gate
//! - Notices, polls, maintenance tickets and billing
//! - Society chat with a live event stream

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod documents;
mod error;
mod extract;
mod handlers;
mod integrations;
mod pin;
mod realtime;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod tests;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize logging
    let log_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("society_api={}", log_level).parse()?)
        .add_directive("tower_http=debug".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Initializing Society Hub API...");
    let addr: SocketAddr = config.bind_address().parse()?;
    let state = Arc::new(AppState::new(config).await?);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Society Hub API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
