//! Jira issue-tracker connector (REST API v2)
//!
//! Creating the issue is required. Resolving and setting the assignee is
//! best effort: the selected responder is reported even when Jira does not
//! know their account.

use async_trait::async_trait;
use choreo_core::domain::output::Assignment;
use choreo_core::{Category, CoreResult, Incident, IssueTracker, Outcome, Severity, TeamMember};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::analysis::select_assignee;
use crate::config::JiraConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{ensure_success, read_json, str_field};

const SERVICE: &str = "jira";

/// Fallback display name when nobody can be selected
pub const UNASSIGNED: &str = "On-call Engineer";

/// Opens the incident issue and assigns a responder
#[derive(Debug, Clone)]
pub struct JiraClient {
    config: JiraConfig,
    client: Client,
}

impl JiraClient {
    /// Create a new client
    pub fn new(config: JiraConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(
            self.config.username.as_deref().unwrap_or_default(),
            self.config.api_token.as_deref(),
        )
    }

    async fn create_issue(&self, base_url: &str, incident: &Incident) -> ConnectorResult<String> {
        let response = self
            .authed(self.client.post(format!("{}/rest/api/2/issue", base_url)))
            .json(&issue_payload(&self.config.project_key, incident))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        str_field(SERVICE, &body, "/key")
    }

    async fn assign(&self, base_url: &str, issue_key: &str, email: &str) -> ConnectorResult<()> {
        let response = self
            .authed(self.client.get(format!("{}/rest/api/2/user/search", base_url)))
            .query(&[("query", email)])
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let users = read_json(SERVICE, response).await?;
        let account_id = str_field(SERVICE, &users, "/0/accountId")?;

        let response = self
            .authed(self.client.put(format!(
                "{}/rest/api/2/issue/{}/assignee",
                base_url, issue_key
            )))
            .json(&json!({ "accountId": account_id }))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        ensure_success(SERVICE, response).await
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn assign_and_notify(
        &self,
        incident: &Incident,
        team: &[TeamMember],
    ) -> CoreResult<Outcome<Assignment>> {
        let selected = select_assignee(incident, team);
        let assignee = selected
            .map(|m| m.name.clone())
            .unwrap_or_else(|| UNASSIGNED.to_string());
        let assignee_id = selected.map(|m| m.id.clone());

        let base_url = match self.config.url.as_deref() {
            Some(url) if self.config.is_configured() => url.trim_end_matches('/').to_string(),
            _ => {
                warn!(incident_id = %incident.id, "Jira not configured, using demo issue");
                let issue_key = format!("{}-{}", self.config.project_key, incident.id.short());
                return Ok(Outcome::demo(
                    Assignment {
                        issue_url: format!("https://demo.atlassian.net/browse/{}", issue_key),
                        issue_key,
                        assignee: Some(assignee),
                        assignee_id,
                    },
                    "demo mode: Jira not configured",
                ));
            }
        };

        let issue_key = self.create_issue(&base_url, incident).await?;
        if let Some(email) = selected.and_then(|m| m.email.as_deref()) {
            if let Err(e) = self.assign(&base_url, &issue_key, email).await {
                warn!(issue_key = %issue_key, error = %e, "Jira assignee not set");
            }
        }

        info!(
            incident_id = %incident.id,
            issue_key = %issue_key,
            assignee = %assignee,
            "Jira issue created and assigned"
        );
        Ok(Outcome::live(Assignment {
            issue_url: format!("{}/browse/{}", base_url, issue_key),
            issue_key,
            assignee: Some(assignee),
            assignee_id,
        }))
    }
}

fn priority(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Highest",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
    }
}

/// Labels: `incident`, the severity, the category unless unknown, up to three tags
pub fn labels(incident: &Incident) -> Vec<String> {
    let mut labels = vec!["incident".to_string(), incident.severity.as_str().to_string()];
    if incident.category != Category::Unknown {
        labels.push(incident.category.as_str().to_string());
    }
    labels.extend(incident.tags.iter().take(3).cloned());
    labels.into_iter().map(|l| l.replace(' ', "-")).collect()
}

fn description(incident: &Incident) -> String {
    let mut parts = vec![
        "h2. Incident Details".to_string(),
        String::new(),
        format!("*Severity:* {}", incident.severity.as_str().to_uppercase()),
        format!("*Category:* {}", incident.category.as_str()),
        format!("*Detected:* {}", incident.detected_at.format("%Y-%m-%d %H:%M:%S UTC")),
        String::new(),
        "h3. Description".to_string(),
        incident.description.clone(),
        String::new(),
    ];
    if !incident.affected_services.is_empty() {
        parts.push("h3. Affected Services".to_string());
        parts.extend(incident.affected_services.iter().map(|s| format!("* {}", s)));
        parts.push(String::new());
    }
    if let Some(root_cause) = &incident.root_cause {
        parts.push("h3. Root Cause Hypothesis".to_string());
        parts.push(root_cause.clone());
        parts.push(String::new());
    }
    parts.push("----".to_string());
    parts.push(format!("_Internal ID: {}_", incident.id));
    parts.join("\n")
}

fn issue_payload(project_key: &str, incident: &Incident) -> Value {
    json!({
        "fields": {
            "project": { "key": project_key },
            "summary": format!("[INCIDENT] {}", incident.title),
            "description": description(incident),
            "issuetype": { "name": "Bug" },
            "priority": { "name": priority(incident.severity) },
            "labels": labels(incident),
        }
    })
}
