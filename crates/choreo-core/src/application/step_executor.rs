use crate::{
    application::lifecycle::WorkflowLifecycleService,
    application::result_propagator::ResultPropagator,
    collaborators::Collaborators,
    domain::incident::Incident,
    domain::output::{Diagnostics, DiagnosticsReport, Outcome, RootCauseAnalysis, StepOutput},
    domain::repository::IncidentRepository,
    domain::step::{StepStatus, ToolId, WorkflowStep},
    domain::workflow::{Workflow, WorkflowId},
    CoreError, CoreResult,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Results of the earlier steps a step declared it depends on
///
/// Only declared dependencies are visible. A dependency that failed, is
/// still pending or produced a different variant resolves to `None`.
#[derive(Debug)]
pub struct StepDependencies<'a> {
    resolved: Vec<(u8, Option<&'a StepOutput>)>,
}

impl<'a> StepDependencies<'a> {
    /// Resolve `step`'s dependencies from the workflow's step list
    pub fn resolve(workflow: &'a Workflow, step: &WorkflowStep) -> Self {
        let resolved = step
            .depends_on
            .iter()
            .map(|number| {
                let output = workflow
                    .step(*number)
                    .filter(|dep| dep.status == StepStatus::Completed)
                    .and_then(|dep| dep.result.as_ref())
                    .and_then(|result| result.output());
                (*number, output)
            })
            .collect();
        Self { resolved }
    }

    /// Output of a declared dependency
    pub fn output(&self, number: u8) -> Option<&'a StepOutput> {
        self.resolved
            .iter()
            .find(|(n, _)| *n == number)
            .and_then(|(_, output)| *output)
    }

    /// Declared dependencies with no usable output
    pub fn unavailable(&self) -> Vec<u8> {
        self.resolved
            .iter()
            .filter(|(_, output)| output.is_none())
            .map(|(n, _)| *n)
            .collect()
    }

    /// Diagnostics from any declared dependency
    pub fn diagnostics(&self) -> Option<&'a Diagnostics> {
        self.resolved
            .iter()
            .filter_map(|(_, output)| *output)
            .find_map(StepOutput::as_diagnostics)
    }

    /// Root cause analysis from any declared dependency
    pub fn root_cause(&self) -> Option<&'a RootCauseAnalysis> {
        self.resolved
            .iter()
            .filter_map(|(_, output)| *output)
            .find_map(StepOutput::as_root_cause)
    }
}

/// Runs the fixed step sequence of one workflow
///
/// Steps run strictly one after another. A failing step is recorded and the
/// run moves on; only store problems end a run early.
pub struct StepExecutor {
    lifecycle: WorkflowLifecycleService,
    incident_repo: Arc<dyn IncidentRepository>,
    collaborators: Collaborators,
    propagator: ResultPropagator,
    step_delay: Duration,
}

impl StepExecutor {
    /// Create a new step executor
    pub fn new(
        lifecycle: WorkflowLifecycleService,
        incident_repo: Arc<dyn IncidentRepository>,
        collaborators: Collaborators,
        propagator: ResultPropagator,
    ) -> Self {
        Self {
            lifecycle,
            incident_repo,
            collaborators,
            propagator,
            step_delay: Duration::ZERO,
        }
    }

    /// Pause between steps, zero to disable
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Execute every step of a running workflow, then finalize it
    ///
    /// Stops starting new steps once the workflow has been cancelled; the
    /// step in flight at that moment is still recorded.
    pub async fn run(&self, workflow_id: &WorkflowId) -> CoreResult<Workflow> {
        let workflow = self.lifecycle.get(workflow_id).await?;
        let numbers: Vec<u8> = workflow.steps.iter().map(|s| s.number).collect();

        info!(
            workflow_id = %workflow_id,
            incident_id = %workflow.incident_id,
            "Executing workflow"
        );

        for (idx, number) in numbers.iter().copied().enumerate() {
            let mut workflow = match self
                .lifecycle
                .update(workflow_id, |w| w.begin_step(number))
                .await
            {
                Ok(workflow) => workflow,
                Err(e) if e.is_invalid_transition() => {
                    info!(workflow_id = %workflow_id, step = number, "Workflow no longer running, stopping");
                    return self.lifecycle.get(workflow_id).await;
                }
                Err(e) => return self.abort(workflow_id, e).await,
            };
            self.lifecycle.publish_events(&mut workflow);

            let incident = match self.incident_repo.get(&workflow.incident_id).await {
                Ok(Some(incident)) => incident,
                Ok(None) => {
                    let e = CoreError::NotFound(format!("Incident {}", workflow.incident_id));
                    return self.abort(workflow_id, e).await;
                }
                Err(e) => return self.abort(workflow_id, e).await,
            };

            debug!(workflow_id = %workflow_id, step = number, "Step started");
            let attempt = self.invoke(&workflow, number, &incident).await;

            let recorded = match attempt {
                Ok(Outcome { value, note }) => {
                    if let Some(note) = &note {
                        warn!(workflow_id = %workflow_id, step = number, note = %note, "Step answered with synthetic data");
                    }
                    self.record_success(workflow_id, number, value, note).await
                }
                Err(e) => {
                    warn!(workflow_id = %workflow_id, step = number, error = %e, "Step failed, continuing");
                    self.lifecycle
                        .update(workflow_id, |w| w.fail_step(number, e.to_string()))
                        .await
                        .map(|mut workflow| self.lifecycle.publish_events(&mut workflow))
                }
            };
            if let Err(e) = recorded {
                return self.abort(workflow_id, e).await;
            }

            if !self.step_delay.is_zero() && idx + 1 < numbers.len() {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        match self.lifecycle.finalize(workflow_id).await {
            Ok(workflow) => Ok(workflow),
            Err(e) if e.is_invalid_transition() => {
                // cancelled while the last step was in flight
                self.lifecycle.get(workflow_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn record_success(
        &self,
        workflow_id: &WorkflowId,
        number: u8,
        output: StepOutput,
        note: Option<String>,
    ) -> CoreResult<()> {
        let mut workflow = self
            .lifecycle
            .update(workflow_id, |w| w.complete_step(number, output, note))
            .await?;

        let result = workflow
            .step(number)
            .and_then(|s| s.result.clone())
            .ok_or_else(|| CoreError::Internal(format!("Step {} has no result", number)))?;

        // step:completed goes out only after the incident reflects the result
        if let Err(e) = self
            .propagator
            .apply(workflow_id, &workflow.incident_id, number, &result)
            .await
        {
            let reason = e.to_string();
            error!(workflow_id = %workflow_id, step = number, error = %reason, "Result propagation failed");
            workflow.mark_propagation_failed(number, reason.as_str())?;
            self.lifecycle
                .update(workflow_id, |w| w.mark_propagation_failed(number, reason.as_str()))
                .await?;
        }
        self.lifecycle.publish_events(&mut workflow);

        info!(
            workflow_id = %workflow_id,
            step = number,
            duration_ms = ?workflow.step(number).and_then(|s| s.duration_ms),
            "Step completed"
        );
        Ok(())
    }

    /// Call the collaborator bound to step `number`
    ///
    /// A panicking collaborator is reported as a step failure.
    async fn invoke(
        &self,
        workflow: &Workflow,
        number: u8,
        incident: &Incident,
    ) -> CoreResult<Outcome<StepOutput>> {
        let step = workflow
            .step(number)
            .ok_or_else(|| CoreError::NotFound(format!("Step {}", number)))?;
        let deps = StepDependencies::resolve(workflow, step);
        let missing = deps.unavailable();
        if !missing.is_empty() {
            debug!(
                workflow_id = %workflow.id,
                step = number,
                unavailable = ?missing,
                "Proceeding without upstream results"
            );
        }

        let tool = step.tool;
        let call = self.call_tool(tool, incident, workflow, &deps);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(CoreError::CollaboratorError(format!("{} panicked", tool))),
        }
    }

    async fn call_tool(
        &self,
        tool: ToolId,
        incident: &Incident,
        workflow: &Workflow,
        deps: &StepDependencies<'_>,
    ) -> CoreResult<Outcome<StepOutput>> {
        let c = &self.collaborators;
        let repositories = &workflow.inputs.repositories;

        match tool {
            ToolId::TicketingCreateTicket => Ok(c
                .ticketing
                .create_ticket(incident)
                .await?
                .map(StepOutput::Ticket)),
            ToolId::ChatSendAlert => Ok(c.chat.send_alert(incident).await?.map(StepOutput::ChatAlert)),
            ToolId::CodeHostGatherDiagnostics => {
                let diagnostics = c.code_host.gather_diagnostics(incident, repositories).await?;
                let issue = match c.code_host.create_issue(incident, repositories).await {
                    Ok(issue) => Some(issue.value),
                    Err(e) => {
                        warn!(incident_id = %incident.id, error = %e, "Code-host issue not created");
                        None
                    }
                };
                Ok(diagnostics.map(|diagnostics| {
                    StepOutput::Diagnostics(DiagnosticsReport { diagnostics, issue })
                }))
            }
            ToolId::AiAnalyzeRootCause => Ok(c
                .ai
                .analyze_root_cause(incident, deps.diagnostics())
                .await?
                .map(StepOutput::RootCause)),
            ToolId::WikiCreatePage => Ok(c
                .wiki
                .create_page(incident, deps.root_cause(), deps.diagnostics())
                .await?
                .map(StepOutput::WikiPage)),
            ToolId::IssueTrackerAssignAndNotify => Ok(c
                .issue_tracker
                .assign_and_notify(incident, &workflow.inputs.team_members)
                .await?
                .map(StepOutput::Assignment)),
            ToolId::MonitoringSetup => Ok(c.monitoring.setup(incident).await.map(StepOutput::Monitoring)),
        }
    }

    async fn abort(&self, workflow_id: &WorkflowId, cause: CoreError) -> CoreResult<Workflow> {
        error!(workflow_id = %workflow_id, error = %cause, "Workflow cannot continue");
        if let Err(e) = self.lifecycle.fail(workflow_id, &cause.to_string()).await {
            error!(workflow_id = %workflow_id, error = %e, "Could not mark workflow failed");
        }
        Err(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::testing::StubCollaborators;
    use crate::collaborators::{MockChat, MockTicketing};
    use crate::domain::events::testing::RecordingPublisher;
    use crate::domain::events::EventTopic;
    use crate::domain::incident::{Category, Severity};
    use crate::domain::output::Ticket;
    use crate::domain::repository::memory::{MemoryIncidentRepository, MemoryWorkflowRepository};
    use crate::domain::workflow::{WorkflowInputs, WorkflowStatus};

    struct Harness {
        lifecycle: WorkflowLifecycleService,
        executor: StepExecutor,
        incidents: Arc<MemoryIncidentRepository>,
        publisher: Arc<RecordingPublisher>,
        incident: Incident,
    }

    async fn harness(collaborators: Collaborators) -> Harness {
        let incidents = Arc::new(MemoryIncidentRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let lifecycle = WorkflowLifecycleService::new(
            Arc::new(MemoryWorkflowRepository::new()),
            incidents.clone(),
            publisher.clone(),
        );
        let propagator = ResultPropagator::new(incidents.clone(), publisher.clone());
        let executor = StepExecutor::new(lifecycle.clone(), incidents.clone(), collaborators, propagator);

        let incident = Incident::new(
            "Orders database failover stuck",
            "Replica promotion has not completed after 10 minutes",
            Severity::Critical,
            Category::Database,
        );
        incidents.put(&incident).await.unwrap();

        Harness {
            lifecycle,
            executor,
            incidents,
            publisher,
            incident,
        }
    }

    #[tokio::test]
    async fn test_dependencies_flow_to_later_steps() {
        let stub = Arc::new(StubCollaborators::new());
        let h = harness(stub.clone().into_collaborators()).await;
        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();

        let done = h.executor.run(&wf.id).await.unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);

        let diagnostics = stub.canned_diagnostics();
        assert_eq!(stub.analyzer_inputs(), vec![Some(diagnostics.clone())]);

        let wiki = stub.wiki_inputs();
        assert_eq!(wiki.len(), 1);
        assert_eq!(wiki[0].1, Some(diagnostics));
        let analysis = done.step(4).and_then(|s| s.result.as_ref()).and_then(|r| r.output()).and_then(|o| o.as_root_cause()).cloned();
        assert_eq!(wiki[0].0, analysis);
    }

    #[tokio::test]
    async fn test_failed_diagnostics_degrades_downstream() {
        let stub = Arc::new(StubCollaborators::new().failing(ToolId::CodeHostGatherDiagnostics));
        let h = harness(stub.clone().into_collaborators()).await;
        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();

        let done = h.executor.run(&wf.id).await.unwrap();
        assert_eq!(done.status, WorkflowStatus::CompletedWithErrors);
        assert_eq!(done.failed_steps, 1);
        assert_eq!(done.completed_steps, 6);
        assert_eq!(stub.analyzer_inputs(), vec![None]);
        assert_eq!(done.step(4).unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_event_order_for_a_step() {
        let stub = Arc::new(StubCollaborators::new());
        let h = harness(stub.into_collaborators()).await;
        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();
        h.executor.run(&wf.id).await.unwrap();

        let step_one: Vec<EventTopic> = h
            .publisher
            .events()
            .into_iter()
            .filter(|e| e.step_number == Some(1))
            .map(|e| e.topic)
            .collect();
        assert_eq!(
            step_one,
            vec![
                EventTopic::StepStarted,
                EventTopic::IncidentUpdated,
                EventTopic::StepCompleted
            ]
        );

        let topics = h.publisher.topics();
        assert_eq!(topics.first(), Some(&EventTopic::WorkflowStarted));
        assert_eq!(topics.last(), Some(&EventTopic::WorkflowCompleted));
    }

    #[tokio::test]
    async fn test_mocked_collaborators_called_once_each() {
        let stub = Arc::new(StubCollaborators::new());
        let mut collaborators = stub.into_collaborators();

        let mut ticketing = MockTicketing::new();
        ticketing.expect_create_ticket().times(1).returning(|incident| {
            Ok(Outcome::demo(
                Ticket {
                    ticket_id: "DEMO-1".to_string(),
                    ticket_url: format!("https://demo/{}", incident.id),
                    priority: incident.severity.priority().to_string(),
                },
                "demo mode: ServiceNow not configured",
            ))
        });
        let mut chat = MockChat::new();
        chat.expect_send_alert()
            .times(1)
            .returning(|_| Err(CoreError::CollaboratorError("slack: invalid_auth".to_string())));
        collaborators.ticketing = Arc::new(ticketing);
        collaborators.chat = Arc::new(chat);

        let h = harness(collaborators).await;
        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();
        let done = h.executor.run(&wf.id).await.unwrap();

        let ticket_step = done.step(1).unwrap();
        match ticket_step.result.as_ref().unwrap() {
            crate::domain::step::StepResult::Success { note, .. } => {
                assert_eq!(note.as_deref(), Some("demo mode: ServiceNow not configured"))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(
            done.step(2).unwrap().result.as_ref().and_then(|r| r.error()),
            Some("Collaborator error: slack: invalid_auth")
        );

        let incident = h.incidents.get(&h.incident.id).await.unwrap().unwrap();
        assert_eq!(incident.ticket_id.as_deref(), Some("DEMO-1"));
        assert!(incident.chat_channel_id.is_none());
    }

    #[tokio::test]
    async fn test_missing_incident_fails_workflow() {
        let stub = Arc::new(StubCollaborators::new());
        let h = harness(stub.into_collaborators()).await;
        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();

        // swap the executor onto an empty incident store
        let empty = Arc::new(MemoryIncidentRepository::new());
        let executor = StepExecutor::new(
            h.lifecycle.clone(),
            empty.clone(),
            Arc::new(StubCollaborators::new()).into_collaborators(),
            ResultPropagator::new(empty, h.publisher.clone()),
        );

        let err = executor.run(&wf.id).await.unwrap_err();
        assert!(err.is_not_found());
        let stored = h.lifecycle.get(&wf.id).await.unwrap();
        assert_eq!(stored.status, WorkflowStatus::Failed);
    }

    // Reads succeed, writes are refused
    struct ReadOnlyIncidents(Arc<MemoryIncidentRepository>);

    #[async_trait::async_trait]
    impl IncidentRepository for ReadOnlyIncidents {
        async fn get(&self, id: &crate::domain::incident::IncidentId) -> CoreResult<Option<Incident>> {
            self.0.get(id).await
        }

        async fn put(&self, _incident: &Incident) -> CoreResult<()> {
            Err(CoreError::StateStoreError("incident store is read-only".to_string()))
        }

        async fn list(&self) -> CoreResult<Vec<Incident>> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn test_propagation_failure_is_recorded_on_step_and_event() {
        let stub = Arc::new(StubCollaborators::new());
        let h = harness(stub.into_collaborators()).await;
        let read_only = Arc::new(ReadOnlyIncidents(h.incidents.clone()));
        let executor = StepExecutor::new(
            h.lifecycle.clone(),
            h.incidents.clone(),
            Arc::new(StubCollaborators::new()).into_collaborators(),
            ResultPropagator::new(read_only, h.publisher.clone()),
        );

        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();
        let done = executor.run(&wf.id).await.unwrap();

        // the collaborator call still counts as a completed step
        assert_eq!(done.status, WorkflowStatus::Completed);
        let ticket_step = done.step(1).unwrap();
        assert_eq!(ticket_step.status, StepStatus::Completed);
        assert_eq!(
            ticket_step.propagation_error.as_deref(),
            Some("State store error: incident store is read-only")
        );
        // monitoring writes no incident fields, so nothing could fail
        assert!(done.step(7).unwrap().propagation_error.is_none());

        let completed = h
            .publisher
            .events()
            .into_iter()
            .find(|e| e.topic == EventTopic::StepCompleted && e.step_number == Some(1))
            .unwrap();
        assert_eq!(completed.payload["propagated"], serde_json::json!(false));
        assert!(completed.payload["propagation_error"].is_string());

        let incident = h.incidents.get(&h.incident.id).await.unwrap().unwrap();
        assert!(incident.ticket_id.is_none());
    }

    #[tokio::test]
    async fn test_step_delay_is_applied() {
        let stub = Arc::new(StubCollaborators::new());
        let h = harness(stub.into_collaborators()).await;
        let executor = StepExecutor::new(
            h.lifecycle.clone(),
            h.incidents.clone(),
            Arc::new(StubCollaborators::new()).into_collaborators(),
            ResultPropagator::new(h.incidents.clone(), h.publisher.clone()),
        )
        .with_step_delay(Duration::from_millis(20));

        let wf = h.lifecycle.create(&h.incident.id, WorkflowInputs::default()).await.unwrap();
        let started = std::time::Instant::now();
        let done = executor.run(&wf.id).await.unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        // six pauses between seven steps
        assert!(started.elapsed() >= Duration::from_millis(120));
    }
}
