//! Typed results of the collaborator contracts
//!
//! One struct per collaborator operation, and [`StepOutput`] as the tagged
//! union the executor stores on a step and the propagator matches on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A collaborator reply, possibly synthetic
///
/// Real and demo replies share the same payload type; only `note` tells
/// them apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The contract payload
    pub value: T,
    /// Set when the reply is synthetic or the feature is disabled
    pub note: Option<String>,
}

impl<T> Outcome<T> {
    /// A reply from the live system
    pub fn live(value: T) -> Self {
        Self { value, note: None }
    }

    /// A synthetic reply with an explanatory note
    pub fn demo(value: T, note: impl Into<String>) -> Self {
        Self {
            value,
            note: Some(note.into()),
        }
    }

    /// Map the payload, keeping the note
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            note: self.note,
        }
    }
}

/// `ticketing.createTicket`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket number
    pub ticket_id: String,
    /// Ticket link
    pub ticket_url: String,
    /// Priority derived from severity
    pub priority: String,
}

/// `chat.sendAlert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAlert {
    /// Dedicated incident channel ID
    pub channel_id: String,
    /// Dedicated incident channel name
    pub channel_name: String,
    /// Channel the alert was broadcast to
    pub alert_channel: String,
}

/// A recent commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// `org/repo`
    pub repository: String,
    /// Abbreviated SHA
    pub sha: String,
    /// First line of the message
    pub message: String,
    /// Author name
    pub author: String,
    /// Commit date
    pub date: Option<DateTime<Utc>>,
    /// Web link
    pub url: Option<String>,
}

/// A recent deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// `org/repo`
    pub repository: String,
    /// Deployment ID
    pub id: u64,
    /// Target environment
    pub environment: String,
    /// Deployed ref
    pub git_ref: String,
    /// Deployment time
    pub created_at: Option<DateTime<Utc>>,
}

/// An open or recently merged pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// `org/repo`
    pub repository: String,
    /// PR number
    pub number: u64,
    /// PR title
    pub title: String,
    /// Web link
    pub url: Option<String>,
}

/// A failed CI run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRun {
    /// `org/repo`
    pub repository: String,
    /// Workflow name
    pub name: String,
    /// Web link
    pub url: Option<String>,
}

/// `codehost.gatherDiagnostics`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Recent commits across the analysed repositories
    #[serde(default)]
    pub commits: Vec<Commit>,
    /// Recent production deployments
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    /// Recent pull requests
    #[serde(default)]
    pub pull_requests: Vec<PullRequest>,
    /// Failed CI runs
    #[serde(default)]
    pub failed_runs: Vec<FailedRun>,
}

impl Diagnostics {
    /// True when nothing was collected
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
            && self.deployments.is_empty()
            && self.pull_requests.is_empty()
            && self.failed_runs.is_empty()
    }
}

/// `codehost.createIssue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeIssue {
    /// Issue number
    pub issue_number: u64,
    /// Issue link
    pub issue_url: String,
}

/// Step 3 result: diagnostics plus the optional code-host issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Collected diagnostics
    pub diagnostics: Diagnostics,
    /// Tracking issue, absent when creation failed
    pub issue: Option<CodeIssue>,
}

/// How sure the analyser is about the hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Speculative
    Low,
    /// Plausible
    Medium,
    /// Strongly supported by the evidence
    High,
}

/// `ai.analyzeRootCause`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    /// Hypothesis text
    pub root_cause: String,
    /// Contributing factors
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    /// Confidence in the hypothesis
    pub confidence: Confidence,
    /// Things to do right now
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    /// Follow-up recommendations
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Human-readable estimate, e.g. `1-2 hours`
    pub estimated_time_to_resolve: String,
}

/// `wiki.createPage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiPage {
    /// Page ID
    pub page_id: String,
    /// Page link
    pub page_url: String,
    /// Page title
    pub title: String,
}

/// `issuetracker.assignAndNotify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Issue key, e.g. `INC-42`
    pub issue_key: String,
    /// Issue link
    pub issue_url: String,
    /// Assignee display name
    pub assignee: Option<String>,
    /// Assignee responder ID
    pub assignee_id: Option<String>,
}

/// `monitoring.setup`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSetup {
    /// Always true by contract
    pub monitoring_enabled: bool,
    /// Dashboard link
    pub dashboard_url: String,
    /// Which integrations are linked to the incident
    #[serde(default)]
    pub tracking: BTreeMap<String, bool>,
}

/// Tagged union of step results, one variant per collaborator contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    /// Step 1
    Ticket(Ticket),
    /// Step 2
    ChatAlert(ChatAlert),
    /// Step 3
    Diagnostics(DiagnosticsReport),
    /// Step 4
    RootCause(RootCauseAnalysis),
    /// Step 5
    WikiPage(WikiPage),
    /// Step 6
    Assignment(Assignment),
    /// Step 7
    Monitoring(MonitoringSetup),
}

impl StepOutput {
    /// Number of the step whose contract produces this variant
    pub fn step_number(&self) -> u8 {
        match self {
            StepOutput::Ticket(_) => 1,
            StepOutput::ChatAlert(_) => 2,
            StepOutput::Diagnostics(_) => 3,
            StepOutput::RootCause(_) => 4,
            StepOutput::WikiPage(_) => 5,
            StepOutput::Assignment(_) => 6,
            StepOutput::Monitoring(_) => 7,
        }
    }

    /// Diagnostics, if this is a step 3 result
    pub fn as_diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            StepOutput::Diagnostics(report) => Some(&report.diagnostics),
            _ => None,
        }
    }

    /// Analysis, if this is a step 4 result
    pub fn as_root_cause(&self) -> Option<&RootCauseAnalysis> {
        match self {
            StepOutput::RootCause(analysis) => Some(analysis),
            _ => None,
        }
    }
}
