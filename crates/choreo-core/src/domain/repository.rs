//! Store ports for the engine
//!
//! The engine never holds a process-wide registry. Callers inject an
//! implementation of these traits; `choreo-state-inmemory` provides the
//! default one. Implementations need per-entry atomic replace and safe
//! concurrent access, nothing more.

use async_trait::async_trait;

use super::incident::{Incident, IncidentId};
use super::workflow::{Workflow, WorkflowId, WorkflowStatus};
use crate::CoreError;

/// Filter for workflow listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    /// Only workflows in this status
    pub status: Option<WorkflowStatus>,
    /// Only workflows for this incident
    pub incident_id: Option<IncidentId>,
}

impl WorkflowFilter {
    /// Filter by status
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by incident
    pub fn for_incident(mut self, incident_id: IncidentId) -> Self {
        self.incident_id = Some(incident_id);
        self
    }

    /// True if `workflow` passes every set criterion
    pub fn matches(&self, workflow: &Workflow) -> bool {
        self.status.map_or(true, |s| workflow.status == s)
            && self
                .incident_id
                .as_ref()
                .map_or(true, |id| &workflow.incident_id == id)
    }
}

/// Registry of workflow runs
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Find a workflow by ID
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError>;

    /// Insert or replace a workflow
    async fn put(&self, workflow: &Workflow) -> Result<(), CoreError>;

    /// List workflows matching the filter, oldest first
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError>;
}

/// Registry of incidents
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Find an incident by ID
    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, CoreError>;

    /// Insert or replace an incident
    async fn put(&self, incident: &Incident) -> Result<(), CoreError>;

    /// List all incidents, oldest first
    async fn list(&self) -> Result<Vec<Incident>, CoreError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod memory {
    //! Concurrent-map repositories for tests

    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// DashMap-backed workflow repository
    #[derive(Clone, Default)]
    pub struct MemoryWorkflowRepository {
        workflows: Arc<DashMap<String, Workflow>>,
    }

    impl MemoryWorkflowRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl WorkflowRepository for MemoryWorkflowRepository {
        async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
            Ok(self.workflows.get(&id.0).map(|w| w.value().clone()))
        }

        async fn put(&self, workflow: &Workflow) -> Result<(), CoreError> {
            self.workflows.insert(workflow.id.0.clone(), workflow.clone());
            Ok(())
        }

        async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
            let mut found: Vec<Workflow> = self
                .workflows
                .iter()
                .filter(|entry| filter.matches(entry.value()))
                .map(|entry| entry.value().clone())
                .collect();
            found.sort_by_key(|w| w.created_at);
            Ok(found)
        }
    }

    /// DashMap-backed incident repository
    #[derive(Clone, Default)]
    pub struct MemoryIncidentRepository {
        incidents: Arc<DashMap<String, Incident>>,
    }

    impl MemoryIncidentRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl IncidentRepository for MemoryIncidentRepository {
        async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, CoreError> {
            Ok(self.incidents.get(&id.0).map(|i| i.value().clone()))
        }

        async fn put(&self, incident: &Incident) -> Result<(), CoreError> {
            self.incidents.insert(incident.id.0.clone(), incident.clone());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Incident>, CoreError> {
            let mut found: Vec<Incident> =
                self.incidents.iter().map(|e| e.value().clone()).collect();
            found.sort_by_key(|i| i.created_at);
            Ok(found)
        }
    }
}
