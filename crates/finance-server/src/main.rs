mod alpha_vantage;
mod configuration;
mod error;
mod routes;
mod state;
mod tools;

use anyhow::Context;
use finance::systems::System;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::alpha_vantage::AlphaVantageClient;
use crate::configuration::Settings;
use crate::state::AppState;
use crate::tools::FinanceSystem;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()?;

    let client = AlphaVantageClient::new(
        &settings.alpha_vantage.base_url,
        settings.api_key(),
        settings.alpha_vantage.timeout(),
    )
    .context("Failed to build the Alpha Vantage client")?;
    let system = FinanceSystem::new(client);
    let tool_names: Vec<_> = system.tools().iter().map(|tool| tool.name.as_str()).collect();
    info!("available tools: {}", tool_names.join(", "));

    let state = AppState::new(Arc::new(system));

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = settings.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("listening on http://{}/mcp", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
