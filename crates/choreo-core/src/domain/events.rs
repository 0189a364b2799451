use crate::domain::incident::IncidentId;
use crate::domain::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle topics observers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// A workflow was created and registered
    #[serde(rename = "workflow:started")]
    WorkflowStarted,
    /// A step was marked running
    #[serde(rename = "workflow:step:started")]
    StepStarted,
    /// A step completed and its result was propagated
    #[serde(rename = "workflow:step:completed")]
    StepCompleted,
    /// A step failed
    #[serde(rename = "workflow:step:failed")]
    StepFailed,
    /// A workflow reached `completed` or `completed_with_errors`
    #[serde(rename = "workflow:completed")]
    WorkflowCompleted,
    /// A workflow was cancelled
    #[serde(rename = "workflow:cancelled")]
    WorkflowCancelled,
    /// An incident was registered
    #[serde(rename = "incident:created")]
    IncidentCreated,
    /// The result propagator changed an incident
    #[serde(rename = "incident:updated")]
    IncidentUpdated,
}

impl EventTopic {
    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::WorkflowStarted => "workflow:started",
            EventTopic::StepStarted => "workflow:step:started",
            EventTopic::StepCompleted => "workflow:step:completed",
            EventTopic::StepFailed => "workflow:step:failed",
            EventTopic::WorkflowCompleted => "workflow:completed",
            EventTopic::WorkflowCancelled => "workflow:cancelled",
            EventTopic::IncidentCreated => "incident:created",
            EventTopic::IncidentUpdated => "incident:updated",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Topic
    pub topic: EventTopic,
    /// Workflow the event belongs to, absent for incident-only events
    pub workflow_id: Option<WorkflowId>,
    /// Incident the event concerns
    pub incident_id: IncidentId,
    /// Step number for step events
    pub step_number: Option<u8>,
    /// Topic-specific payload
    pub payload: Value,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Event bound to a workflow run
    pub fn for_workflow(
        topic: EventTopic,
        workflow_id: &WorkflowId,
        incident_id: &IncidentId,
        payload: Value,
    ) -> Self {
        Self {
            topic,
            workflow_id: Some(workflow_id.clone()),
            incident_id: incident_id.clone(),
            step_number: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Event about an incident only
    pub fn for_incident(topic: EventTopic, incident_id: &IncidentId, payload: Value) -> Self {
        Self {
            topic,
            workflow_id: None,
            incident_id: incident_id.clone(),
            step_number: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Attach a step number
    pub fn with_step(mut self, number: u8) -> Self {
        self.step_number = Some(number);
        self
    }

    /// True if a subscriber scoped to `scope` should see this event
    pub fn matches(&self, scope: &EventScope) -> bool {
        match scope {
            EventScope::All => true,
            EventScope::Workflow(id) => self.workflow_id.as_ref() == Some(id),
            EventScope::Incident(id) => &self.incident_id == id,
        }
    }
}

/// Subscription filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// Every event
    All,
    /// Events of one workflow run
    Workflow(WorkflowId),
    /// Events concerning one incident, across runs
    Incident(IncidentId),
}

/// Publish/subscribe port the engine emits into
///
/// Delivery is best-effort. Implementations must not block and must not fail
/// the caller.
pub trait EventPublisher: Send + Sync {
    /// Broadcast an event to current subscribers
    fn publish(&self, event: WorkflowEvent);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Publisher that keeps everything it was given

    use super::*;
    use std::sync::Mutex;

    /// Records published events in order
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<WorkflowEvent>>,
    }

    impl RecordingPublisher {
        /// Create an empty recorder
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything published so far
        pub fn events(&self) -> Vec<WorkflowEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        /// Topic sequence, handy for ordering assertions
        pub fn topics(&self) -> Vec<EventTopic> {
            self.events().into_iter().map(|e| e.topic).collect()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: WorkflowEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_wire_names() {
        assert_eq!(EventTopic::StepFailed.as_str(), "workflow:step:failed");
        assert_eq!(
            serde_json::to_value(EventTopic::IncidentUpdated).unwrap(),
            json!("incident:updated")
        );
    }

    #[test]
    fn test_scope_matching() {
        let wf = WorkflowId("wf-1".to_string());
        let inc = IncidentId("INC-1".to_string());
        let event = WorkflowEvent::for_workflow(EventTopic::StepStarted, &wf, &inc, json!({}))
            .with_step(2);

        assert!(event.matches(&EventScope::All));
        assert!(event.matches(&EventScope::Workflow(wf.clone())));
        assert!(event.matches(&EventScope::Incident(inc.clone())));
        assert!(!event.matches(&EventScope::Workflow(WorkflowId("wf-2".to_string()))));

        let incident_only = WorkflowEvent::for_incident(EventTopic::IncidentCreated, &inc, json!({}));
        assert!(!incident_only.matches(&EventScope::Workflow(wf)));
        assert!(incident_only.matches(&EventScope::Incident(inc)));
    }
}
