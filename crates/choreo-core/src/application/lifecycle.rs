use crate::{
    domain::events::EventPublisher,
    domain::incident::IncidentId,
    domain::repository::{IncidentRepository, WorkflowFilter, WorkflowRepository},
    domain::workflow::{Workflow, WorkflowId, WorkflowInputs},
    CoreError, CoreResult,
};
use super::write_locks::WriteLocks;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner of workflow-level state
///
/// Every write to a stored workflow goes through [`update`](Self::update),
/// which serializes writers of the same workflow so a cancel cannot be lost
/// between the executor's read and write.
pub struct WorkflowLifecycleService {
    workflow_repo: Arc<dyn WorkflowRepository>,
    incident_repo: Arc<dyn IncidentRepository>,
    publisher: Arc<dyn EventPublisher>,
    write_locks: Arc<WriteLocks<WorkflowId>>,
}

impl WorkflowLifecycleService {
    /// Create a new lifecycle service
    pub fn new(
        workflow_repo: Arc<dyn WorkflowRepository>,
        incident_repo: Arc<dyn IncidentRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            workflow_repo,
            incident_repo,
            publisher,
            write_locks: Arc::new(WriteLocks::new()),
        }
    }

    /// Register a running workflow for an existing incident
    ///
    /// Publishes `workflow:started`. Execution is started by the caller.
    pub async fn create(
        &self,
        incident_id: &IncidentId,
        inputs: WorkflowInputs,
    ) -> CoreResult<Workflow> {
        if self.incident_repo.get(incident_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Incident {}", incident_id)));
        }

        let mut workflow = Workflow::new(incident_id.clone(), inputs);
        workflow.start()?;

        self.workflow_repo.put(&workflow).await?;
        self.publish_events(&mut workflow);

        info!(
            workflow_id = %workflow.id,
            incident_id = %incident_id,
            steps = workflow.total_steps(),
            "Workflow created"
        );
        Ok(workflow)
    }

    /// Settle a run whose steps have all been attempted
    pub async fn finalize(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        let mut workflow = self.update(id, |w| w.finalize()).await?;
        self.publish_events(&mut workflow);

        info!(
            workflow_id = %id,
            status = ?workflow.status,
            completed_steps = workflow.completed_steps,
            failed_steps = workflow.failed_steps,
            duration_ms = ?workflow.duration_ms,
            "Workflow finished"
        );
        Ok(workflow)
    }

    /// Cancel a pending or running workflow
    ///
    /// Advisory only: a step already in flight still completes and is recorded.
    pub async fn cancel(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        let mut workflow = self.update(id, |w| w.cancel()).await.map_err(|e| {
            warn!(workflow_id = %id, error = %e, "Cancel rejected");
            e
        })?;
        self.publish_events(&mut workflow);

        info!(workflow_id = %id, current_step = workflow.current_step, "Workflow cancelled");
        Ok(workflow)
    }

    /// Put a failed workflow back to `running` with its failed steps reset
    ///
    /// The caller re-runs the executor from step 1.
    pub async fn retry(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        let mut workflow = self.update(id, |w| w.retry()).await.map_err(|e| {
            warn!(workflow_id = %id, error = %e, "Retry rejected");
            e
        })?;
        self.publish_events(&mut workflow);

        info!(workflow_id = %id, "Workflow retrying from step 1");
        Ok(workflow)
    }

    /// Mark a run `failed` for a reason outside any step
    pub async fn fail(&self, id: &WorkflowId, reason: &str) -> CoreResult<Workflow> {
        let mut workflow = self.update(id, |w| w.fail(reason)).await?;
        self.publish_events(&mut workflow);

        warn!(workflow_id = %id, reason, "Workflow failed");
        Ok(workflow)
    }

    /// Fetch a workflow
    pub async fn get(&self, id: &WorkflowId) -> CoreResult<Workflow> {
        self.workflow_repo
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Workflow {}", id)))
    }

    /// List workflows
    pub async fn list(&self, filter: &WorkflowFilter) -> CoreResult<Vec<Workflow>> {
        self.workflow_repo.list(filter).await
    }

    /// Load, mutate and store a workflow under its write lock
    ///
    /// Returns the stored state with the events the mutation recorded. Nothing
    /// is stored when `mutate` fails.
    pub async fn update<F>(&self, id: &WorkflowId, mutate: F) -> CoreResult<Workflow>
    where
        F: FnOnce(&mut Workflow) -> CoreResult<()>,
    {
        let _guard = self.write_locks.acquire(id).await;

        let mut workflow = self.get(id).await?;
        mutate(&mut workflow)?;
        self.workflow_repo.put(&workflow).await?;
        Ok(workflow)
    }

    /// Publish the events a committed mutation recorded
    pub fn publish_events(&self, workflow: &mut Workflow) {
        for event in workflow.take_events() {
            debug!(
                workflow_id = %workflow.id,
                topic = %event.topic,
                step = ?event.step_number,
                "Publishing event"
            );
            self.publisher.publish(event);
        }
    }
}

impl Clone for WorkflowLifecycleService {
    fn clone(&self) -> Self {
        Self {
            workflow_repo: self.workflow_repo.clone(),
            incident_repo: self.incident_repo.clone(),
            publisher: self.publisher.clone(),
            write_locks: self.write_locks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::testing::RecordingPublisher;
    use crate::domain::events::EventTopic;
    use crate::domain::incident::{Category, Incident, Severity};
    use crate::domain::repository::memory::{MemoryIncidentRepository, MemoryWorkflowRepository};
    use crate::domain::workflow::WorkflowStatus;

    struct Fixture {
        service: WorkflowLifecycleService,
        publisher: Arc<RecordingPublisher>,
        incident: Incident,
    }

    async fn fixture() -> Fixture {
        let incidents = Arc::new(MemoryIncidentRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let incident = Incident::new(
            "Checkout API returning 500s",
            "Error rate above 20% since 10:02 UTC",
            Severity::High,
            Category::Application,
        );
        incidents.put(&incident).await.unwrap();

        let service = WorkflowLifecycleService::new(
            Arc::new(MemoryWorkflowRepository::new()),
            incidents,
            publisher.clone(),
        );
        Fixture {
            service,
            publisher,
            incident,
        }
    }

    #[tokio::test]
    async fn test_create_registers_running_workflow() {
        let f = fixture().await;
        let wf = f
            .service
            .create(&f.incident.id, WorkflowInputs::default())
            .await
            .unwrap();

        assert_eq!(wf.status, WorkflowStatus::Running);
        assert!(wf.started_at.is_some());
        let stored = f.service.get(&wf.id).await.unwrap();
        assert_eq!(stored.status, WorkflowStatus::Running);
        assert_eq!(f.publisher.topics(), vec![EventTopic::WorkflowStarted]);
    }

    #[tokio::test]
    async fn test_create_for_unknown_incident_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .create(&IncidentId("INC-NOPE".to_string()), WorkflowInputs::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(f.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let f = fixture().await;
        let missing = WorkflowId("missing".to_string());
        assert!(f.service.get(&missing).await.unwrap_err().is_not_found());
        assert!(f.service.cancel(&missing).await.unwrap_err().is_not_found());
        assert!(f.service.retry(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cancel_twice_is_rejected_without_mutation() {
        let f = fixture().await;
        let wf = f
            .service
            .create(&f.incident.id, WorkflowInputs::default())
            .await
            .unwrap();

        let cancelled = f.service.cancel(&wf.id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);

        let err = f.service.cancel(&wf.id).await.unwrap_err();
        assert!(err.is_invalid_transition());
        let stored = f.service.get(&wf.id).await.unwrap();
        assert_eq!(stored.completed_at, cancelled.completed_at);
        assert_eq!(
            f.publisher.topics(),
            vec![EventTopic::WorkflowStarted, EventTopic::WorkflowCancelled]
        );
    }

    #[tokio::test]
    async fn test_retry_running_workflow_is_rejected() {
        let f = fixture().await;
        let wf = f
            .service
            .create(&f.incident.id, WorkflowInputs::default())
            .await
            .unwrap();
        assert!(f.service.retry(&wf.id).await.unwrap_err().is_invalid_transition());
        assert_eq!(f.service.get(&wf.id).await.unwrap().status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_fail_then_retry() {
        let f = fixture().await;
        let wf = f
            .service
            .create(&f.incident.id, WorkflowInputs::default())
            .await
            .unwrap();

        let failed = f.service.fail(&wf.id, "store unavailable").await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("store unavailable"));

        let retried = f.service.retry(&wf.id).await.unwrap();
        assert_eq!(retried.status, WorkflowStatus::Running);
        assert!(retried.error.is_none());
    }

    #[tokio::test]
    async fn test_write_locks_do_not_outlive_writes() {
        let f = fixture().await;
        let shared = f.service.clone();
        let wf = f
            .service
            .create(&f.incident.id, WorkflowInputs::default())
            .await
            .unwrap();

        f.service.cancel(&wf.id).await.unwrap();
        assert!(!f.service.write_locks.contains(&wf.id));

        // rejected and unknown-id writes release their entry too
        assert!(shared.cancel(&wf.id).await.is_err());
        assert!(shared.cancel(&WorkflowId("missing".into())).await.is_err());
        assert!(f.service.write_locks.is_empty());
    }
}
