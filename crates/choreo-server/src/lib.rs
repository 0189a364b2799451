//!
//! Choreo Server - HTTP API for the choreography engine
//!
//! Wires the in-memory stores, the event bus and the configured connectors
//! into a `RuntimeInterface` and serves it over axum.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use choreo_connectors::{build_collaborators, ConnectorConfig};
use choreo_core::{Collaborators, EngineSettings, RuntimeInterface};
use choreo_state_inmemory::{EventBus, InMemoryStateStoreProvider};

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Canned incidents for the simulator
pub mod scenarios;

// Re-export key types
pub use api::{build_router, AppState};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};

/// Build the engine over fresh in-memory stores
pub fn build_state(collaborators: Collaborators, settings: EngineSettings) -> AppState {
    let provider = InMemoryStateStoreProvider::new();
    let (workflow_repo, incident_repo) = provider.create_repositories();
    let bus = Arc::new(EventBus::new());

    let runtime = RuntimeInterface::new(
        workflow_repo,
        incident_repo,
        bus.clone(),
        collaborators,
        settings,
    );
    AppState::new(runtime, bus)
}

/// Build the engine with connectors configured from the environment
pub fn build_state_from_env(config: &ServerConfig) -> ServerResult<AppState> {
    let connector_config = ConnectorConfig::from_env()?;
    let collaborators = build_collaborators(&connector_config)?;
    Ok(build_state(
        collaborators,
        EngineSettings {
            step_delay: config.step_delay(),
        },
    ))
}

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let state = build_state_from_env(&config)?;
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, environment = %config.environment, "Choreo server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
