use crate::{
    application::lifecycle::WorkflowLifecycleService,
    application::result_propagator::ResultPropagator,
    application::step_executor::StepExecutor,
    collaborators::Collaborators,
    domain::events::{EventPublisher, EventTopic, WorkflowEvent},
    domain::incident::{Incident, IncidentId},
    domain::repository::{IncidentRepository, WorkflowFilter, WorkflowRepository},
    domain::workflow::{Workflow, WorkflowId, WorkflowInputs, WorkflowStatus},
    CoreError, CoreResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Summary information about a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow ID
    pub id: WorkflowId,

    /// Incident ID
    pub incident_id: IncidentId,

    /// Display name
    pub name: String,

    /// Current status
    pub status: WorkflowStatus,

    /// Step currently or last executing
    pub current_step: u8,

    /// Number of steps in the run
    pub total_steps: usize,

    /// Steps completed so far
    pub completed_steps: u32,

    /// Steps failed so far
    pub failed_steps: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Run start timestamp
    pub started_at: Option<DateTime<Utc>>,

    /// Terminal timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Run duration
    pub duration_ms: Option<i64>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            incident_id: workflow.incident_id.clone(),
            name: workflow.name.clone(),
            status: workflow.status,
            current_step: workflow.current_step,
            total_steps: workflow.total_steps(),
            completed_steps: workflow.completed_steps,
            failed_steps: workflow.failed_steps,
            created_at: workflow.created_at,
            started_at: workflow.started_at,
            completed_at: workflow.completed_at,
            duration_ms: workflow.duration_ms,
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Pause between consecutive steps
    pub step_delay: Duration,
}

/// The main API the engine offers to adapters (HTTP, CLI, tests)
#[derive(Clone)]
pub struct RuntimeInterface {
    lifecycle: WorkflowLifecycleService,
    executor: Arc<StepExecutor>,
    incident_repo: Arc<dyn IncidentRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl RuntimeInterface {
    /// Wire the engine from its injected parts
    pub fn new(
        workflow_repo: Arc<dyn WorkflowRepository>,
        incident_repo: Arc<dyn IncidentRepository>,
        publisher: Arc<dyn EventPublisher>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        let lifecycle =
            WorkflowLifecycleService::new(workflow_repo, incident_repo.clone(), publisher.clone());
        let propagator = ResultPropagator::new(incident_repo.clone(), publisher.clone());
        let executor = StepExecutor::new(
            lifecycle.clone(),
            incident_repo.clone(),
            collaborators,
            propagator,
        )
        .with_step_delay(settings.step_delay);

        Self {
            lifecycle,
            executor: Arc::new(executor),
            incident_repo,
            publisher,
        }
    }

    /// Register an incident and announce it
    pub async fn report_incident(&self, incident: Incident) -> CoreResult<Incident> {
        if incident.title.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Incident title must not be empty".to_string(),
            ));
        }

        self.incident_repo.put(&incident).await?;
        self.publisher.publish(WorkflowEvent::for_incident(
            EventTopic::IncidentCreated,
            &incident.id,
            json!({
                "title": incident.title,
                "severity": incident.severity,
                "category": incident.category,
            }),
        ));

        info!(
            incident_id = %incident.id,
            severity = incident.severity.as_str(),
            "Incident reported"
        );
        Ok(incident)
    }

    /// Create a workflow for `incident` and run it in the background
    ///
    /// The incident is registered first if the store does not know it yet.
    /// Returns as soon as the run is registered as `running`.
    pub async fn execute_workflow(
        &self,
        incident: Incident,
        inputs: WorkflowInputs,
    ) -> CoreResult<Workflow> {
        if self.incident_repo.get(&incident.id).await?.is_none() {
            self.report_incident(incident.clone()).await?;
        }

        let workflow = self.lifecycle.create(&incident.id, inputs).await?;
        self.spawn_run(workflow.id.clone());
        Ok(workflow)
    }

    /// Create a workflow and wait for the run to end
    pub async fn run_workflow(
        &self,
        incident: Incident,
        inputs: WorkflowInputs,
    ) -> CoreResult<Workflow> {
        if self.incident_repo.get(&incident.id).await?.is_none() {
            self.report_incident(incident.clone()).await?;
        }

        let workflow = self.lifecycle.create(&incident.id, inputs).await?;
        self.executor.run(&workflow.id).await
    }

    /// Fetch a workflow with its per-step detail
    pub async fn get_workflow_by_id(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        self.lifecycle.get(id).await
    }

    /// List workflows, oldest first
    pub async fn list_workflows(&self, filter: &WorkflowFilter) -> CoreResult<Vec<WorkflowSummary>> {
        let workflows = self.lifecycle.list(filter).await?;
        Ok(workflows.iter().map(WorkflowSummary::from).collect())
    }

    /// Cancel a pending or running workflow
    pub async fn cancel_workflow(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        self.lifecycle.cancel(id).await
    }

    /// Reset the failed steps of a workflow and run it again from step 1
    pub async fn retry_workflow(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        let workflow = self.lifecycle.retry(id).await?;
        self.spawn_run(workflow.id.clone());
        Ok(workflow)
    }

    /// Fetch an incident
    pub async fn get_incident(&self, id: &IncidentId) -> CoreResult<Incident> {
        self.incident_repo
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Incident {}", id)))
    }

    /// List incidents, oldest first
    pub async fn list_incidents(&self) -> CoreResult<Vec<Incident>> {
        self.incident_repo.list().await
    }

    fn spawn_run(&self, workflow_id: WorkflowId) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.run(&workflow_id).await {
                error!(workflow_id = %workflow_id, error = %e, "Workflow run ended with error");
            }
        });
    }
}
