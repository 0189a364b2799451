use crate::domain::output::StepOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collaborator capability a step is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolId {
    /// `ticketing.createTicket`
    #[serde(rename = "ticketing.createTicket")]
    TicketingCreateTicket,
    /// `chat.sendAlert`
    #[serde(rename = "chat.sendAlert")]
    ChatSendAlert,
    /// `codehost.gatherDiagnostics`
    #[serde(rename = "codehost.gatherDiagnostics")]
    CodeHostGatherDiagnostics,
    /// `ai.analyzeRootCause`
    #[serde(rename = "ai.analyzeRootCause")]
    AiAnalyzeRootCause,
    /// `wiki.createPage`
    #[serde(rename = "wiki.createPage")]
    WikiCreatePage,
    /// `issuetracker.assignAndNotify`
    #[serde(rename = "issuetracker.assignAndNotify")]
    IssueTrackerAssignAndNotify,
    /// `monitoring.setup`
    #[serde(rename = "monitoring.setup")]
    MonitoringSetup,
}

impl ToolId {
    /// Dotted capability name
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::TicketingCreateTicket => "ticketing.createTicket",
            ToolId::ChatSendAlert => "chat.sendAlert",
            ToolId::CodeHostGatherDiagnostics => "codehost.gatherDiagnostics",
            ToolId::AiAnalyzeRootCause => "ai.analyzeRootCause",
            ToolId::WikiCreatePage => "wiki.createPage",
            ToolId::IssueTrackerAssignAndNotify => "issuetracker.assignAndNotify",
            ToolId::MonitoringSetup => "monitoring.setup",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one step in the fixed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    /// Position in the sequence, 1-based
    pub number: u8,
    /// Human-readable name
    pub name: &'static str,
    /// Bound collaborator
    pub tool: ToolId,
    /// Earlier step numbers whose results this step consumes
    pub depends_on: &'static [u8],
}

/// The canonical incident response sequence
pub const STEP_CATALOGUE: [StepDefinition; 7] = [
    StepDefinition {
        number: 1,
        name: "Create ServiceNow Ticket",
        tool: ToolId::TicketingCreateTicket,
        depends_on: &[],
    },
    StepDefinition {
        number: 2,
        name: "Send Slack Alert",
        tool: ToolId::ChatSendAlert,
        depends_on: &[],
    },
    StepDefinition {
        number: 3,
        name: "Gather Diagnostic Information",
        tool: ToolId::CodeHostGatherDiagnostics,
        depends_on: &[],
    },
    StepDefinition {
        number: 4,
        name: "Analyze Root Cause",
        tool: ToolId::AiAnalyzeRootCause,
        depends_on: &[3],
    },
    StepDefinition {
        number: 5,
        name: "Create Confluence Incident Page",
        tool: ToolId::WikiCreatePage,
        depends_on: &[3, 4],
    },
    StepDefinition {
        number: 6,
        name: "Assign and Notify",
        tool: ToolId::IssueTrackerAssignAndNotify,
        depends_on: &[],
    },
    StepDefinition {
        number: 7,
        name: "Monitor and Update",
        tool: ToolId::MonitoringSetup,
        depends_on: &[],
    },
];

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not attempted in the current run
    Pending,
    /// Collaborator call in flight
    Running,
    /// Collaborator succeeded
    Completed,
    /// Collaborator failed
    Failed,
}

/// What a step attempt produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepResult {
    /// The collaborator returned its contract payload
    Success {
        /// Typed payload
        output: StepOutput,
        /// Demo or disabled-feature marker
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// The collaborator raised or returned an error
    Failure {
        /// Error message
        error: String,
    },
}

impl StepResult {
    /// Payload of a successful attempt
    pub fn output(&self) -> Option<&StepOutput> {
        match self {
            StepResult::Success { output, .. } => Some(output),
            StepResult::Failure { .. } => None,
        }
    }

    /// Error message of a failed attempt
    pub fn error(&self) -> Option<&str> {
        match self {
            StepResult::Success { .. } => None,
            StepResult::Failure { error } => Some(error),
        }
    }

    /// Demo or disabled-feature marker of a successful attempt
    pub fn note(&self) -> Option<&str> {
        match self {
            StepResult::Success { note, .. } => note.as_deref(),
            StepResult::Failure { .. } => None,
        }
    }
}

/// One unit of work inside a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step number, immutable
    pub number: u8,
    /// Human-readable name
    pub name: String,
    /// Bound collaborator, immutable
    pub tool: ToolId,
    /// Step numbers whose results this step consumes
    pub depends_on: Vec<u8>,
    /// Current status
    pub status: StepStatus,
    /// Attempt start
    pub started_at: Option<DateTime<Utc>>,
    /// Attempt end
    pub completed_at: Option<DateTime<Utc>>,
    /// Attempt duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Attempt result
    pub result: Option<StepResult>,
    /// Why a successful result never reached the incident
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_error: Option<String>,
}

impl From<&StepDefinition> for WorkflowStep {
    fn from(def: &StepDefinition) -> Self {
        Self {
            number: def.number,
            name: def.name.to_string(),
            tool: def.tool,
            depends_on: def.depends_on.to_vec(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            result: None,
            propagation_error: None,
        }
    }
}

impl WorkflowStep {
    /// True once the step has a terminal status for this run
    pub fn is_attempted(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed)
    }

    /// Back to `pending`, forgetting the previous attempt
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.duration_ms = None;
        self.result = None;
        self.propagation_error = None;
    }

    pub(crate) fn finish(&mut self, status: StepStatus, result: StepResult) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
        self.result = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_is_ordered_and_dependencies_point_backwards() {
        for (idx, def) in STEP_CATALOGUE.iter().enumerate() {
            assert_eq!(def.number as usize, idx + 1);
            assert!(def.depends_on.iter().all(|dep| *dep < def.number));
        }
        assert_eq!(STEP_CATALOGUE[3].depends_on, &[3]);
        assert_eq!(STEP_CATALOGUE[4].depends_on, &[3, 4]);
    }

    #[test]
    fn test_tool_id_serializes_as_capability_name() {
        let json = serde_json::to_string(&ToolId::AiAnalyzeRootCause).unwrap();
        assert_eq!(json, "\"ai.analyzeRootCause\"");
        assert_eq!(ToolId::WikiCreatePage.to_string(), "wiki.createPage");
    }

    #[test]
    fn test_reset_clears_attempt() {
        let mut step = WorkflowStep::from(&STEP_CATALOGUE[1]);
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        step.finish(
            StepStatus::Failed,
            StepResult::Failure {
                error: "channel_limit".to_string(),
            },
        );
        assert!(step.is_attempted());
        assert_eq!(step.result.as_ref().and_then(|r| r.error()), Some("channel_limit"));

        step.propagation_error = Some("incident store unavailable".to_string());
        step.reset();
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.result.is_none());
        assert!(step.propagation_error.is_none());
        assert!(step.duration_ms.is_none());
    }
}
