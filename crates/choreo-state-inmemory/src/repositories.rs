use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use choreo_core::{
    domain::repository::{IncidentRepository, WorkflowFilter, WorkflowRepository},
    CoreError, Incident, IncidentId, Workflow, WorkflowId,
};

/// In-memory implementation of the WorkflowRepository
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl InMemoryWorkflowRepository {
    /// Create a new in-memory workflow repository over shared storage
    pub fn new(workflows: Arc<RwLock<HashMap<String, Workflow>>>) -> Self {
        Self { workflows }
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn put(&self, workflow: &Workflow) -> Result<(), CoreError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow.clone());
        debug!(workflow_id = %workflow.id, status = ?workflow.status, "Stored workflow");
        Ok(())
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
        let workflows = self.workflows.read().await;

        let mut result: Vec<Workflow> = workflows
            .values()
            .filter(|workflow| filter.matches(workflow))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        Ok(result)
    }
}

/// In-memory implementation of the IncidentRepository
pub struct InMemoryIncidentRepository {
    incidents: Arc<RwLock<HashMap<String, Incident>>>,
}

impl InMemoryIncidentRepository {
    /// Create a new in-memory incident repository over shared storage
    pub fn new(incidents: Arc<RwLock<HashMap<String, Incident>>>) -> Self {
        Self { incidents }
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, CoreError> {
        let incidents = self.incidents.read().await;
        Ok(incidents.get(&id.0).cloned())
    }

    async fn put(&self, incident: &Incident) -> Result<(), CoreError> {
        let mut incidents = self.incidents.write().await;
        incidents.insert(incident.id.0.clone(), incident.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Incident>, CoreError> {
        let incidents = self.incidents.read().await;

        let mut result: Vec<Incident> = incidents.values().cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        Ok(result)
    }
}
