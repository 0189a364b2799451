//! Confluence wiki connector (REST content API)

use async_trait::async_trait;
use choreo_core::domain::output::{Diagnostics, RootCauseAnalysis, WikiPage};
use choreo_core::{CoreResult, Incident, Outcome, Severity, Wiki};
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::config::ConfluenceConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{read_json, str_field};

const SERVICE: &str = "confluence";

/// Creates the incident page in the configured space
#[derive(Debug, Clone)]
pub struct ConfluenceClient {
    config: ConfluenceConfig,
    enabled: bool,
    client: Client,
}

impl ConfluenceClient {
    /// Create a new client; `enabled` is the docs feature flag
    pub fn new(config: ConfluenceConfig, enabled: bool, client: Client) -> Self {
        Self {
            config,
            enabled,
            client,
        }
    }

    async fn post_page(&self, base_url: &str, title: &str, body: String) -> ConnectorResult<String> {
        let response = self
            .client
            .post(format!("{}/rest/api/content", base_url))
            .basic_auth(
                self.config.username.as_deref().unwrap_or_default(),
                self.config.api_token.as_deref(),
            )
            .json(&json!({
                "type": "page",
                "title": title,
                "space": { "key": self.config.space_key },
                "body": {
                    "storage": { "value": body, "representation": "storage" }
                },
            }))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        str_field(SERVICE, &body, "/id")
    }
}

#[async_trait]
impl Wiki for ConfluenceClient {
    async fn create_page(
        &self,
        incident: &Incident,
        analysis: Option<&RootCauseAnalysis>,
        diagnostics: Option<&Diagnostics>,
    ) -> CoreResult<Outcome<WikiPage>> {
        let title = page_title(incident);
        let note = if !self.enabled {
            Some("confluence docs disabled")
        } else if !self.config.is_configured() {
            warn!(incident_id = %incident.id, "Confluence not configured, using demo page");
            Some("demo mode: Confluence not configured")
        } else {
            None
        };
        let base_url = match (note, self.config.url.as_deref()) {
            (None, Some(url)) => url.trim_end_matches('/').to_string(),
            (note, _) => {
                let page_id = format!("demo-{}", incident.id.short().to_lowercase());
                return Ok(Outcome::demo(
                    WikiPage {
                        page_url: format!(
                            "https://demo.atlassian.net/wiki/spaces/{}/pages/{}",
                            self.config.space_key, page_id
                        ),
                        page_id,
                        title,
                    },
                    note.unwrap_or("demo mode: Confluence not configured"),
                ));
            }
        };

        let page_id = self
            .post_page(&base_url, &title, page_body(incident, analysis, diagnostics))
            .await?;
        let page_url = format!(
            "{}/spaces/{}/pages/{}",
            base_url, self.config.space_key, page_id
        );
        info!(incident_id = %incident.id, page_id = %page_id, "Confluence page created");
        Ok(Outcome::live(WikiPage {
            page_id,
            page_url,
            title,
        }))
    }
}

/// `Post-Mortem: <date> - <title>`
pub fn page_title(incident: &Incident) -> String {
    format!(
        "Post-Mortem: {} - {}",
        incident.detected_at.format("%Y-%m-%d"),
        incident.title
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#FF0000",
        Severity::High => "#FF6600",
        Severity::Medium => "#FFCC00",
        Severity::Low => "#00CC00",
    }
}

fn list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("<li>{}</li>", empty);
    }
    items
        .iter()
        .map(|i| format!("<li>{}</li>", escape(i)))
        .collect()
}

/// Storage-format body; analysis and diagnostics sections are filled when available
pub fn page_body(
    incident: &Incident,
    analysis: Option<&RootCauseAnalysis>,
    diagnostics: Option<&Diagnostics>,
) -> String {
    let mut html = String::new();
    html.push_str("<h1>Incident Summary</h1><table>");
    html.push_str(&format!("<tr><td>Incident ID</td><td><code>{}</code></td></tr>", incident.id));
    html.push_str(&format!(
        "<tr><td>Severity</td><td><span style=\"color: {}; font-weight: bold;\">{}</span></td></tr>",
        severity_color(incident.severity),
        incident.severity.as_str().to_uppercase()
    ));
    html.push_str(&format!("<tr><td>Category</td><td>{}</td></tr>", incident.category.as_str()));
    html.push_str(&format!(
        "<tr><td>Detected</td><td>{}</td></tr>",
        incident.detected_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str(&format!(
        "<tr><td>Ticket</td><td>{}</td></tr></table>",
        incident.ticket_id.as_deref().unwrap_or("pending")
    ));

    html.push_str(&format!("<h2>Description</h2><p>{}</p>", escape(&incident.description)));
    html.push_str(&format!(
        "<h2>Affected Services</h2><ul>{}</ul>",
        list(&incident.affected_services, "To be determined")
    ));

    html.push_str("<h2>Root Cause Analysis</h2>");
    match analysis {
        Some(a) => {
            html.push_str(&format!("<p>{}</p>", escape(&a.root_cause)));
            html.push_str(&format!(
                "<p><strong>Confidence:</strong> {:?}</p>",
                a.confidence
            ));
            html.push_str(&format!(
                "<h3>Contributing Factors</h3><ul>{}</ul>",
                list(&a.contributing_factors, "None identified")
            ));
            html.push_str(&format!(
                "<h3>Recommendations</h3><ul>{}</ul>",
                list(&a.recommendations, "None")
            ));
        }
        None => html.push_str("<p>Analysis not available.</p>"),
    }

    html.push_str("<h2>Diagnostics</h2>");
    match diagnostics {
        Some(d) if !d.is_empty() => {
            let commits: Vec<String> = d
                .commits
                .iter()
                .map(|c| format!("{} {}: {}", c.repository, c.sha, c.message))
                .collect();
            let deployments: Vec<String> = d
                .deployments
                .iter()
                .map(|dep| format!("{} #{} ({}) {}", dep.repository, dep.id, dep.environment, dep.git_ref))
                .collect();
            html.push_str(&format!("<h3>Recent Commits</h3><ul>{}</ul>", list(&commits, "None")));
            html.push_str(&format!(
                "<h3>Recent Deployments</h3><ul>{}</ul>",
                list(&deployments, "None")
            ));
            html.push_str(&format!(
                "<p>Failed CI runs: {}. Open pull requests: {}.</p>",
                d.failed_runs.len(),
                d.pull_requests.len()
            ));
        }
        _ => html.push_str("<p>Diagnostics not available.</p>"),
    }

    html.push_str("<h2>Resolution</h2><ul><li>To be documented</li></ul>");
    html
}
