//! In-memory state store implementation for the choreography engine
//!
//! This crate provides in-memory implementations of the repository ports
//! defined in choreo-core, and the broadcast event bus. It is the default
//! backing for development, tests and single-process deployments where
//! persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{InMemoryIncidentRepository, InMemoryWorkflowRepository};

pub mod event_bus;
pub use event_bus::{EventBus, ScopedSubscription};

use choreo_core::{Incident, IncidentRepository, Workflow, WorkflowRepository};

/// Provider for in-memory repositories sharing one storage
pub struct InMemoryStateStoreProvider {
    // Shared storage for workflow runs
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,

    // Shared storage for incidents
    incidents: Arc<RwLock<HashMap<String, Incident>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            incidents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create repositories for use with RuntimeInterface
    pub fn create_repositories(&self) -> (Arc<dyn WorkflowRepository>, Arc<dyn IncidentRepository>) {
        let workflow_repo = Arc::new(InMemoryWorkflowRepository::new(self.workflows.clone()));
        let incident_repo = Arc::new(InMemoryIncidentRepository::new(self.incidents.clone()));
        (workflow_repo, incident_repo)
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
