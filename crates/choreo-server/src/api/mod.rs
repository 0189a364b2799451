//! API module for the choreography server
//!
//! This module contains the HTTP API handlers and the router.

use axum::{
    routing::{get, post},
    Router,
};
use choreo_core::RuntimeInterface;
use choreo_state_inmemory::EventBus;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod health;
pub mod incidents;
pub mod workflows;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Engine entry point
    pub runtime: RuntimeInterface,
    /// Event bus the engine publishes to
    pub bus: Arc<EventBus>,
}

impl AppState {
    /// Bundle the runtime and its bus
    pub fn new(runtime: RuntimeInterface, bus: Arc<EventBus>) -> Self {
        Self { runtime, bus }
    }
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/incident", post(incidents::create_incident))
        .route("/incident/:id", get(incidents::get_incident))
        .route("/incidents", get(incidents::list_incidents))
        .route(
            "/orchestrate/incident-workflow",
            post(incidents::orchestrate_incident_workflow),
        )
        .route("/workflows", get(workflows::list_workflows))
        .route("/workflow/:id", get(workflows::get_workflow))
        .route("/workflow/:id/cancel", post(workflows::cancel_workflow))
        .route("/workflow/:id/retry", post(workflows::retry_workflow))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
