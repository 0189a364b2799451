//! Ports for the external tools the step executor drives
//!
//! Each trait mirrors one collaborator contract. Transport, auth and
//! timeouts are the implementation's concern. An implementation without
//! credentials may answer with [`Outcome::demo`] instead of failing.

use crate::domain::incident::{Incident, TeamMember};
use crate::domain::output::{
    Assignment, ChatAlert, CodeIssue, Diagnostics, MonitoringSetup, Outcome, RootCauseAnalysis,
    Ticket, WikiPage,
};
use crate::CoreResult;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Incident ticketing (step 1)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ticketing: Send + Sync {
    /// Open a ticket for the incident
    async fn create_ticket(&self, incident: &Incident) -> CoreResult<Outcome<Ticket>>;
}

/// Team chat (step 2)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Chat: Send + Sync {
    /// Create the incident channel and broadcast the alert
    async fn send_alert(&self, incident: &Incident) -> CoreResult<Outcome<ChatAlert>>;
}

/// Source control host (step 3)
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Collect commits, deployments, pull requests and failed runs
    async fn gather_diagnostics(
        &self,
        incident: &Incident,
        repositories: &[String],
    ) -> CoreResult<Outcome<Diagnostics>>;

    /// Open a tracking issue
    async fn create_issue(
        &self,
        incident: &Incident,
        repositories: &[String],
    ) -> CoreResult<Outcome<CodeIssue>>;
}

/// Root cause analysis (step 4)
#[async_trait]
pub trait AiAnalyzer: Send + Sync {
    /// Produce a hypothesis; `diagnostics` is `None` when step 3 produced nothing usable
    async fn analyze_root_cause(
        &self,
        incident: &Incident,
        diagnostics: Option<&Diagnostics>,
    ) -> CoreResult<Outcome<RootCauseAnalysis>>;
}

/// Documentation wiki (step 5)
#[async_trait]
pub trait Wiki: Send + Sync {
    /// Create the incident page from whatever upstream data is available
    async fn create_page(
        &self,
        incident: &Incident,
        analysis: Option<&RootCauseAnalysis>,
        diagnostics: Option<&Diagnostics>,
    ) -> CoreResult<Outcome<WikiPage>>;
}

/// Issue tracker (step 6)
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Open an issue, pick an assignee from `team` and notify them
    async fn assign_and_notify(
        &self,
        incident: &Incident,
        team: &[TeamMember],
    ) -> CoreResult<Outcome<Assignment>>;
}

/// Monitoring hookup (step 7), infallible by contract
#[async_trait]
pub trait Monitoring: Send + Sync {
    /// Enable tracking for the incident
    async fn setup(&self, incident: &Incident) -> Outcome<MonitoringSetup>;
}

/// The full set of collaborators a run needs
#[derive(Clone)]
pub struct Collaborators {
    /// Step 1
    pub ticketing: Arc<dyn Ticketing>,
    /// Step 2
    pub chat: Arc<dyn Chat>,
    /// Step 3
    pub code_host: Arc<dyn CodeHost>,
    /// Step 4
    pub ai: Arc<dyn AiAnalyzer>,
    /// Step 5
    pub wiki: Arc<dyn Wiki>,
    /// Step 6
    pub issue_tracker: Arc<dyn IssueTracker>,
    /// Step 7
    pub monitoring: Arc<dyn Monitoring>,
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Deterministic in-process collaborators

    use super::*;
    use crate::domain::output::{Commit, Confidence, Deployment};
    use crate::domain::step::ToolId;
    use crate::CoreError;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Implements every collaborator with canned data
    ///
    /// Tools can be made to fail or to stall, and the inputs handed to the
    /// dependent steps are recorded.
    #[derive(Debug, Default)]
    pub struct StubCollaborators {
        failing: HashSet<ToolId>,
        delays: HashMap<ToolId, Duration>,
        empty_diagnostics: bool,
        calls: Mutex<Vec<ToolId>>,
        analyzer_inputs: Mutex<Vec<Option<Diagnostics>>>,
        wiki_inputs: Mutex<Vec<(Option<RootCauseAnalysis>, Option<Diagnostics>)>>,
    }

    impl StubCollaborators {
        /// Everything succeeds immediately
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `tool` return an error
        pub fn failing(mut self, tool: ToolId) -> Self {
            self.failing.insert(tool);
            self
        }

        /// Make `tool` sleep before answering
        pub fn delayed(mut self, tool: ToolId, delay: Duration) -> Self {
            self.delays.insert(tool, delay);
            self
        }

        /// Make the code host report no data at all
        pub fn with_empty_diagnostics(mut self) -> Self {
            self.empty_diagnostics = true;
            self
        }

        /// Wire this stub into every slot
        pub fn into_collaborators(self: Arc<Self>) -> Collaborators {
            Collaborators {
                ticketing: self.clone(),
                chat: self.clone(),
                code_host: self.clone(),
                ai: self.clone(),
                wiki: self.clone(),
                issue_tracker: self.clone(),
                monitoring: self,
            }
        }

        /// Tools invoked so far, in call order
        pub fn calls(&self) -> Vec<ToolId> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Diagnostics handed to the analyser, one entry per call
        pub fn analyzer_inputs(&self) -> Vec<Option<Diagnostics>> {
            self.analyzer_inputs
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default()
        }

        /// Analysis and diagnostics handed to the wiki, one entry per call
        pub fn wiki_inputs(&self) -> Vec<(Option<RootCauseAnalysis>, Option<Diagnostics>)> {
            self.wiki_inputs.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// The diagnostics this stub reports
        pub fn canned_diagnostics(&self) -> Diagnostics {
            if self.empty_diagnostics {
                return Diagnostics::default();
            }
            Diagnostics {
                commits: vec![Commit {
                    repository: "acme/main-app".to_string(),
                    sha: "a1b2c3d4".to_string(),
                    message: "Raise connection pool size".to_string(),
                    author: "dev".to_string(),
                    date: None,
                    url: None,
                }],
                deployments: vec![Deployment {
                    repository: "acme/main-app".to_string(),
                    id: 1001,
                    environment: "production".to_string(),
                    git_ref: "main".to_string(),
                    created_at: None,
                }],
                pull_requests: Vec::new(),
                failed_runs: Vec::new(),
            }
        }

        async fn enter(&self, tool: ToolId) -> CoreResult<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(tool);
            }
            if let Some(delay) = self.delays.get(&tool) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.contains(&tool) {
                return Err(CoreError::CollaboratorError(format!("{} unavailable", tool)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Ticketing for StubCollaborators {
        async fn create_ticket(&self, incident: &Incident) -> CoreResult<Outcome<Ticket>> {
            self.enter(ToolId::TicketingCreateTicket).await?;
            Ok(Outcome::live(Ticket {
                ticket_id: "INC0010001".to_string(),
                ticket_url: format!("https://stub.service-now.com/incident/{}", incident.id),
                priority: incident.severity.priority().to_string(),
            }))
        }
    }

    #[async_trait]
    impl Chat for StubCollaborators {
        async fn send_alert(&self, incident: &Incident) -> CoreResult<Outcome<ChatAlert>> {
            self.enter(ToolId::ChatSendAlert).await?;
            Ok(Outcome::live(ChatAlert {
                channel_id: "C0STUB".to_string(),
                channel_name: format!("inc-{}", incident.id.short().to_lowercase()),
                alert_channel: "#incident-response".to_string(),
            }))
        }
    }

    #[async_trait]
    impl CodeHost for StubCollaborators {
        async fn gather_diagnostics(
            &self,
            _incident: &Incident,
            _repositories: &[String],
        ) -> CoreResult<Outcome<Diagnostics>> {
            self.enter(ToolId::CodeHostGatherDiagnostics).await?;
            Ok(Outcome::live(self.canned_diagnostics()))
        }

        async fn create_issue(
            &self,
            _incident: &Incident,
            _repositories: &[String],
        ) -> CoreResult<Outcome<CodeIssue>> {
            Ok(Outcome::live(CodeIssue {
                issue_number: 42,
                issue_url: "https://github.com/acme/main-app/issues/42".to_string(),
            }))
        }
    }

    #[async_trait]
    impl AiAnalyzer for StubCollaborators {
        async fn analyze_root_cause(
            &self,
            incident: &Incident,
            diagnostics: Option<&Diagnostics>,
        ) -> CoreResult<Outcome<RootCauseAnalysis>> {
            if let Ok(mut inputs) = self.analyzer_inputs.lock() {
                inputs.push(diagnostics.cloned());
            }
            self.enter(ToolId::AiAnalyzeRootCause).await?;
            let commits = diagnostics.map_or(0, |d| d.commits.len());
            Ok(Outcome::live(RootCauseAnalysis {
                root_cause: format!(
                    "Likely {} regression ({} recent commits reviewed)",
                    incident.category.as_str(),
                    commits
                ),
                contributing_factors: vec!["Recent deployment".to_string()],
                confidence: Confidence::Medium,
                immediate_actions: vec!["Roll back the last deployment".to_string()],
                recommendations: Vec::new(),
                estimated_time_to_resolve: "1-2 hours".to_string(),
            }))
        }
    }

    #[async_trait]
    impl Wiki for StubCollaborators {
        async fn create_page(
            &self,
            incident: &Incident,
            analysis: Option<&RootCauseAnalysis>,
            diagnostics: Option<&Diagnostics>,
        ) -> CoreResult<Outcome<WikiPage>> {
            if let Ok(mut inputs) = self.wiki_inputs.lock() {
                inputs.push((analysis.cloned(), diagnostics.cloned()));
            }
            self.enter(ToolId::WikiCreatePage).await?;
            Ok(Outcome::live(WikiPage {
                page_id: "98765".to_string(),
                page_url: "https://stub.atlassian.net/wiki/pages/98765".to_string(),
                title: format!("Incident {}: {}", incident.id, incident.title),
            }))
        }
    }

    #[async_trait]
    impl IssueTracker for StubCollaborators {
        async fn assign_and_notify(
            &self,
            _incident: &Incident,
            team: &[TeamMember],
        ) -> CoreResult<Outcome<Assignment>> {
            self.enter(ToolId::IssueTrackerAssignAndNotify).await?;
            let assignee = team.first();
            Ok(Outcome::live(Assignment {
                issue_key: "INC-7".to_string(),
                issue_url: "https://stub.atlassian.net/browse/INC-7".to_string(),
                assignee: Some(
                    assignee
                        .map(|m| m.name.clone())
                        .unwrap_or_else(|| "On-call Engineer".to_string()),
                ),
                assignee_id: assignee.map(|m| m.id.clone()),
            }))
        }
    }

    #[async_trait]
    impl Monitoring for StubCollaborators {
        async fn setup(&self, incident: &Incident) -> Outcome<MonitoringSetup> {
            // infallible: failures configured for monitoring are ignored
            let _ = self.enter(ToolId::MonitoringSetup).await;
            let mut tracking = BTreeMap::new();
            tracking.insert("servicenow".to_string(), incident.ticket_id.is_some());
            tracking.insert("slack".to_string(), incident.chat_channel_id.is_some());
            Outcome::live(MonitoringSetup {
                monitoring_enabled: true,
                dashboard_url: format!("https://monitoring.example.com/incidents/{}", incident.id),
                tracking,
            })
        }
    }
}
