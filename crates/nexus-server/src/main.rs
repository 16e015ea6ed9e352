mod configuration;
mod error;
mod routes;
mod state;

use anyhow::Result;
use configuration::Settings;
use nexus::llm::openai::OpenAiModelClient;
use nexus::orchestrator::Orchestrator;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, defaulting to info unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = Settings::new()?;

    let model = OpenAiModelClient::new(settings.model_config())?;
    let orchestrator = Orchestrator::new(Arc::new(model), settings.orchestrator_config());

    // A provider that fails to start is logged and left out of the catalog
    for (alias, spec) in settings.connection_specs() {
        match orchestrator.register_provider(&alias, &spec).await {
            Ok(()) => info!(alias = %alias, command = %spec.command, "Registered provider"),
            Err(e) => error!(alias = %alias, error = %e, "Failed to register provider"),
        }
    }

    // Create app state and router with CORS support
    let state = state::AppState::new(orchestrator.clone());
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
