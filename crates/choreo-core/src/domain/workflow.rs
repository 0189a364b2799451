use crate::{
    domain::events::{EventTopic, WorkflowEvent},
    domain::incident::{IncidentId, TeamMember},
    domain::output::StepOutput,
    domain::step::{StepResult, StepStatus, WorkflowStep, STEP_CATALOGUE},
    CoreError, CoreResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

/// Display name of the incident response workflow
pub const WORKFLOW_NAME: &str = "Incident Response Workflow";

/// Value object: Workflow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, not yet registered as running
    Pending,
    /// Steps are being executed
    Running,
    /// Every step attempted, none failed
    Completed,
    /// Every step attempted, at least one failed
    CompletedWithErrors,
    /// The run could not proceed (store or incident unavailable)
    Failed,
    /// Cancelled by a caller
    Cancelled,
}

impl WorkflowStatus {
    /// No further transitions except retry
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Pending | WorkflowStatus::Running)
    }

    /// Eligible for retry
    pub fn indicates_failure(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::CompletedWithErrors | WorkflowStatus::Failed
        )
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "completed_with_errors" => Ok(WorkflowStatus::CompletedWithErrors),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!(
                "Unknown workflow status: {}",
                other
            ))),
        }
    }
}

/// Caller-supplied run inputs, kept on the workflow so retries reuse them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInputs {
    /// Code-host repositories to analyse
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Responders available for assignment
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
}

/// Aggregate: one execution of the fixed step sequence against one incident
#[derive(Debug, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier
    pub id: WorkflowId,
    /// Incident this run works on
    pub incident_id: IncidentId,
    /// Display name
    pub name: String,
    /// Current status
    pub status: WorkflowStatus,
    /// Steps in ascending number order
    pub steps: Vec<WorkflowStep>,
    /// Number of the step currently or last executing, 0 before the first
    pub current_step: u8,
    /// Steps completed in this run
    pub completed_steps: u32,
    /// Steps failed in this run
    pub failed_steps: u32,
    /// Run inputs
    pub inputs: WorkflowInputs,
    /// Reason for a `failed` status
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Total run duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Pending lifecycle events
    #[serde(skip)]
    pub events: Vec<WorkflowEvent>,
}

// Stored copies never carry undelivered events
impl Clone for Workflow {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            incident_id: self.incident_id.clone(),
            name: self.name.clone(),
            status: self.status,
            steps: self.steps.clone(),
            current_step: self.current_step,
            completed_steps: self.completed_steps,
            failed_steps: self.failed_steps,
            inputs: self.inputs.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
            updated_at: self.updated_at,
            events: Vec::new(),
        }
    }
}

impl Workflow {
    /// Create a pending workflow with the canonical step list
    pub fn new(incident_id: IncidentId, inputs: WorkflowInputs) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId(Uuid::new_v4().to_string()),
            incident_id,
            name: WORKFLOW_NAME.to_string(),
            status: WorkflowStatus::Pending,
            steps: STEP_CATALOGUE.iter().map(WorkflowStep::from).collect(),
            current_step: 0,
            completed_steps: 0,
            failed_steps: 0,
            inputs,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            updated_at: now,
            events: Vec::with_capacity(4),
        }
    }

    /// Number of steps in the sequence
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Steps not yet attempted in this run
    pub fn unattempted_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_attempted()).count()
    }

    /// `completed + failed + unattempted == total`
    pub fn counters_consistent(&self) -> bool {
        self.completed_steps as usize + self.failed_steps as usize + self.unattempted_steps()
            == self.total_steps()
    }

    /// Look up a step by number
    pub fn step(&self, number: u8) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.number == number)
    }

    fn step_mut(&mut self, number: u8) -> CoreResult<&mut WorkflowStep> {
        let id = self.id.clone();
        self.steps
            .iter_mut()
            .find(|s| s.number == number)
            .ok_or_else(|| CoreError::NotFound(format!("Step {} in workflow {}", number, id)))
    }

    /// Update the timestamp
    #[inline]
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record an event to publish once the state is committed
    pub fn record_event(&mut self, event: WorkflowEvent) {
        self.events.push(event);
    }

    /// Drain pending events
    pub fn take_events(&mut self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.events)
    }

    fn event(&self, topic: EventTopic, payload: serde_json::Value) -> WorkflowEvent {
        WorkflowEvent::for_workflow(topic, &self.id, &self.incident_id, payload)
    }

    /// `pending` -> `running`
    pub fn start(&mut self) -> CoreResult<()> {
        if self.status != WorkflowStatus::Pending {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot start workflow in state: {:?}",
                self.status
            )));
        }

        let now = Utc::now();
        self.status = WorkflowStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;

        let event = self.event(
            EventTopic::WorkflowStarted,
            json!({
                "name": self.name,
                "total_steps": self.total_steps(),
                "retry": false,
            }),
        );
        self.record_event(event);
        Ok(())
    }

    /// Mark a step running
    pub fn begin_step(&mut self, number: u8) -> CoreResult<()> {
        if self.status != WorkflowStatus::Running {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot start step {} while workflow is in state: {:?}",
                number, self.status
            )));
        }

        let step = self.step_mut(number)?;
        let previous = step.status;
        step.reset();
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        let payload = json!({ "name": step.name, "tool": step.tool });

        // A retry re-runs steps that completed last time
        match previous {
            StepStatus::Completed => self.completed_steps = self.completed_steps.saturating_sub(1),
            StepStatus::Failed => self.failed_steps = self.failed_steps.saturating_sub(1),
            StepStatus::Pending | StepStatus::Running => {}
        }

        self.current_step = number;
        self.update_timestamp();
        let event = self.event(EventTopic::StepStarted, payload).with_step(number);
        self.record_event(event);
        Ok(())
    }

    /// Record a successful attempt
    ///
    /// Allowed after cancellation so an in-flight step still lands.
    pub fn complete_step(
        &mut self,
        number: u8,
        output: StepOutput,
        note: Option<String>,
    ) -> CoreResult<()> {
        self.ensure_step_running(number)?;

        let step = self.step_mut(number)?;
        step.finish(
            StepStatus::Completed,
            StepResult::Success {
                output,
                note: note.clone(),
            },
        );
        let payload = json!({
            "name": step.name,
            "tool": step.tool,
            "duration_ms": step.duration_ms,
            "result": step.result,
            "note": note,
        });

        self.completed_steps += 1;
        self.update_timestamp();
        let event = self.event(EventTopic::StepCompleted, payload).with_step(number);
        self.record_event(event);
        Ok(())
    }

    /// Record a failed attempt
    pub fn fail_step(&mut self, number: u8, error: impl Into<String>) -> CoreResult<()> {
        self.ensure_step_running(number)?;

        let error = error.into();
        let step = self.step_mut(number)?;
        step.finish(
            StepStatus::Failed,
            StepResult::Failure {
                error: error.clone(),
            },
        );
        let payload = json!({
            "name": step.name,
            "tool": step.tool,
            "duration_ms": step.duration_ms,
            "error": error,
        });

        self.failed_steps += 1;
        self.update_timestamp();
        let event = self.event(EventTopic::StepFailed, payload).with_step(number);
        self.record_event(event);
        Ok(())
    }

    /// Note that a completed step's result could not be copied onto the incident
    ///
    /// The step stays `completed`. A still-pending `step:completed` event for
    /// the step carries the error as well.
    pub fn mark_propagation_failed(&mut self, number: u8, error: impl Into<String>) -> CoreResult<()> {
        let error = error.into();
        let step = self.step_mut(number)?;
        if step.status != StepStatus::Completed {
            return Err(CoreError::InvalidTransition(format!(
                "Step {} is not completed",
                number
            )));
        }
        step.propagation_error = Some(error.clone());

        for event in self
            .events
            .iter_mut()
            .filter(|e| e.topic == EventTopic::StepCompleted && e.step_number == Some(number))
        {
            if let Some(payload) = event.payload.as_object_mut() {
                payload.insert("propagated".to_string(), json!(false));
                payload.insert("propagation_error".to_string(), json!(error));
            }
        }
        self.update_timestamp();
        Ok(())
    }

    fn ensure_step_running(&self, number: u8) -> CoreResult<()> {
        if !matches!(
            self.status,
            WorkflowStatus::Running | WorkflowStatus::Cancelled
        ) {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot record step {} while workflow is in state: {:?}",
                number, self.status
            )));
        }
        match self.step(number) {
            Some(step) if step.status == StepStatus::Running => Ok(()),
            Some(step) => Err(CoreError::InvalidTransition(format!(
                "Step {} is not running: {:?}",
                number, step.status
            ))),
            None => Err(CoreError::NotFound(format!(
                "Step {} in workflow {}",
                number, self.id
            ))),
        }
    }

    /// `running` -> `completed` | `completed_with_errors`, once every step was attempted
    pub fn finalize(&mut self) -> CoreResult<()> {
        if self.status != WorkflowStatus::Running {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot finalize workflow in state: {:?}",
                self.status
            )));
        }
        if self.unattempted_steps() > 0 {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot finalize workflow with {} unattempted steps",
                self.unattempted_steps()
            )));
        }

        self.status = if self.failed_steps == 0 {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::CompletedWithErrors
        };
        self.stamp_completion();

        let event = self.event(
            EventTopic::WorkflowCompleted,
            json!({
                "status": self.status,
                "completed_steps": self.completed_steps,
                "failed_steps": self.failed_steps,
                "duration_ms": self.duration_ms,
            }),
        );
        self.record_event(event);
        Ok(())
    }

    /// `pending` | `running` -> `cancelled`
    pub fn cancel(&mut self) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot cancel workflow in state: {:?}",
                self.status
            )));
        }

        self.status = WorkflowStatus::Cancelled;
        self.stamp_completion();

        let event = self.event(
            EventTopic::WorkflowCancelled,
            json!({
                "current_step": self.current_step,
                "completed_steps": self.completed_steps,
                "failed_steps": self.failed_steps,
            }),
        );
        self.record_event(event);
        Ok(())
    }

    /// `completed_with_errors` | `failed` -> `running`, failed steps back to `pending`
    pub fn retry(&mut self) -> CoreResult<()> {
        if !self.status.indicates_failure() {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot retry workflow in state: {:?}",
                self.status
            )));
        }

        for step in self
            .steps
            .iter_mut()
            .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Running))
        {
            step.reset();
        }
        self.failed_steps = 0;

        let now = Utc::now();
        self.status = WorkflowStatus::Running;
        self.current_step = 0;
        self.error = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.duration_ms = None;
        self.updated_at = now;

        let event = self.event(
            EventTopic::WorkflowStarted,
            json!({
                "name": self.name,
                "total_steps": self.total_steps(),
                "retry": true,
            }),
        );
        self.record_event(event);
        Ok(())
    }

    /// The run could not continue for reasons outside any step
    pub fn fail(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot fail workflow in state: {:?}",
                self.status
            )));
        }

        let reason = reason.into();
        self.status = WorkflowStatus::Failed;
        self.error = Some(reason.clone());
        self.stamp_completion();

        let event = self.event(
            EventTopic::WorkflowCompleted,
            json!({
                "status": self.status,
                "error": reason,
                "completed_steps": self.completed_steps,
                "failed_steps": self.failed_steps,
            }),
        );
        self.record_event(event);
        Ok(())
    }

    fn stamp_completion(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::output::{MonitoringSetup, StepOutput};
    use std::collections::BTreeMap;

    fn workflow() -> Workflow {
        let mut wf = Workflow::new(IncidentId("INC-1".to_string()), WorkflowInputs::default());
        wf.start().unwrap();
        wf
    }

    fn monitoring_output() -> StepOutput {
        StepOutput::Monitoring(MonitoringSetup {
            monitoring_enabled: true,
            dashboard_url: "https://monitoring.example.com/incidents/INC-1".to_string(),
            tracking: BTreeMap::new(),
        })
    }

    fn run_all(wf: &mut Workflow, failing: &[u8]) {
        for n in 1..=7u8 {
            wf.begin_step(n).unwrap();
            if failing.contains(&n) {
                wf.fail_step(n, "boom").unwrap();
            } else {
                wf.complete_step(n, monitoring_output(), None).unwrap();
            }
            assert!(wf.counters_consistent());
        }
    }

    #[test]
    fn test_new_workflow_has_canonical_steps() {
        let wf = Workflow::new(IncidentId("INC-1".to_string()), WorkflowInputs::default());
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.total_steps(), 7);
        let numbers: Vec<u8> = wf.steps.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(wf.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(wf.counters_consistent());
    }

    #[test]
    fn test_start_records_event_once() {
        let mut wf = workflow();
        let events = wf.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, EventTopic::WorkflowStarted);
        assert!(wf.take_events().is_empty());
        assert!(wf.start().unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_finalize_without_failures_is_completed() {
        let mut wf = workflow();
        run_all(&mut wf, &[]);
        wf.finalize().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.completed_steps, 7);
        assert!(wf.completed_at.is_some());
    }

    #[test]
    fn test_finalize_with_failure_is_completed_with_errors() {
        let mut wf = workflow();
        run_all(&mut wf, &[2, 5]);
        wf.finalize().unwrap();
        assert_eq!(wf.status, WorkflowStatus::CompletedWithErrors);
        assert_eq!(wf.completed_steps + wf.failed_steps, 7);
        assert_eq!(wf.failed_steps, 2);
    }

    #[test]
    fn test_finalize_rejects_unattempted_steps() {
        let mut wf = workflow();
        wf.begin_step(1).unwrap();
        wf.complete_step(1, monitoring_output(), None).unwrap();
        assert!(wf.finalize().unwrap_err().is_invalid_transition());
        assert_eq!(wf.status, WorkflowStatus::Running);
    }

    #[test]
    fn test_cancel_only_when_active() {
        let mut wf = workflow();
        wf.cancel().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Cancelled);

        let stamped = wf.completed_at;
        assert!(wf.cancel().unwrap_err().is_invalid_transition());
        assert_eq!(wf.completed_at, stamped);

        let mut done = workflow();
        run_all(&mut done, &[]);
        done.finalize().unwrap();
        assert!(done.cancel().unwrap_err().is_invalid_transition());
        assert_eq!(done.status, WorkflowStatus::Completed);
    }

    #[test]
    fn test_in_flight_step_lands_after_cancel() {
        let mut wf = workflow();
        wf.begin_step(1).unwrap();
        wf.cancel().unwrap();
        wf.complete_step(1, monitoring_output(), None).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Cancelled);
        assert_eq!(wf.step(1).unwrap().status, StepStatus::Completed);
        assert!(wf.begin_step(2).unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_retry_resets_failed_steps_only() {
        let mut wf = workflow();
        run_all(&mut wf, &[2]);
        wf.finalize().unwrap();
        wf.take_events();

        wf.retry().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Running);
        assert_eq!(wf.failed_steps, 0);
        assert_eq!(wf.completed_steps, 6);
        assert_eq!(wf.step(2).unwrap().status, StepStatus::Pending);
        assert!(wf.step(2).unwrap().result.is_none());
        assert_eq!(wf.step(1).unwrap().status, StepStatus::Completed);
        assert!(wf.counters_consistent());

        // re-running a completed step keeps the counters balanced
        wf.begin_step(1).unwrap();
        assert_eq!(wf.completed_steps, 5);
        assert!(wf.counters_consistent());
    }

    #[test]
    fn test_retry_rejected_unless_failed() {
        let mut wf = workflow();
        assert!(wf.retry().unwrap_err().is_invalid_transition());

        run_all(&mut wf, &[]);
        wf.finalize().unwrap();
        assert!(wf.retry().unwrap_err().is_invalid_transition());
        assert_eq!(wf.status, WorkflowStatus::Completed);
    }

    #[test]
    fn test_propagation_failure_marks_step_and_pending_event() {
        let mut wf = workflow();
        wf.take_events();
        wf.begin_step(7).unwrap();
        assert!(wf.mark_propagation_failed(7, "store down").unwrap_err().is_invalid_transition());

        wf.complete_step(7, monitoring_output(), None).unwrap();
        wf.mark_propagation_failed(7, "store down").unwrap();

        let step = wf.step(7).unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.propagation_error.as_deref(), Some("store down"));

        let completed = wf
            .take_events()
            .into_iter()
            .find(|e| e.topic == EventTopic::StepCompleted)
            .unwrap();
        assert_eq!(completed.payload["propagated"], json!(false));
        assert_eq!(completed.payload["propagation_error"], "store down");
        assert_eq!(wf.completed_steps, 1);
    }

    #[test]
    fn test_clone_drops_pending_events() {
        let wf = workflow();
        assert_eq!(wf.events.len(), 1);
        assert!(wf.clone().events.is_empty());
    }
}
