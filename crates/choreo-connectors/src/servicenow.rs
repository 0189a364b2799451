//! ServiceNow ticketing connector (Table API)

use async_trait::async_trait;
use choreo_core::domain::output::Ticket;
use choreo_core::{Category, CoreResult, Incident, Outcome, Severity, Ticketing};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ServiceNowConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{read_json, str_field};

const SERVICE: &str = "servicenow";

/// Creates incident tickets in ServiceNow
#[derive(Debug, Clone)]
pub struct ServiceNowClient {
    config: ServiceNowConfig,
    enabled: bool,
    client: Client,
}

impl ServiceNowClient {
    /// Create a new client; `enabled` is the auto-ticketing feature flag
    pub fn new(config: ServiceNowConfig, enabled: bool, client: Client) -> Self {
        Self {
            config,
            enabled,
            client,
        }
    }

    async fn post_incident(&self, base_url: &str, incident: &Incident) -> ConnectorResult<Ticket> {
        let response = self
            .client
            .post(format!("{}/api/now/table/incident", base_url))
            .basic_auth(
                self.config.username.as_deref().unwrap_or_default(),
                self.config.password.as_deref(),
            )
            .header("Accept", "application/json")
            .json(&ticket_payload(incident))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;

        let body = read_json(SERVICE, response).await?;
        let number = str_field(SERVICE, &body, "/result/number")?;
        let sys_id = str_field(SERVICE, &body, "/result/sys_id")?;

        Ok(Ticket {
            ticket_id: number,
            ticket_url: format!("{}/nav_to.do?uri=incident.do?sys_id={}", base_url, sys_id),
            priority: incident.severity.priority().to_string(),
        })
    }
}

#[async_trait]
impl Ticketing for ServiceNowClient {
    async fn create_ticket(&self, incident: &Incident) -> CoreResult<Outcome<Ticket>> {
        if !self.enabled {
            return Ok(Outcome::demo(demo_ticket(incident), "auto-ticketing disabled"));
        }
        let base_url = match self.config.base_url() {
            Some(url) if self.config.is_configured() => url,
            _ => {
                warn!(incident_id = %incident.id, "ServiceNow not configured, using demo ticket");
                return Ok(Outcome::demo(
                    demo_ticket(incident),
                    "demo mode: ServiceNow not configured",
                ));
            }
        };

        let ticket = self.post_incident(&base_url, incident).await?;
        info!(incident_id = %incident.id, ticket_id = %ticket.ticket_id, "ServiceNow incident created");
        Ok(Outcome::live(ticket))
    }
}

fn ticket_payload(incident: &Incident) -> Value {
    json!({
        "short_description": incident.title,
        "description": ticket_description(incident),
        "impact": impact(incident.severity),
        "urgency": urgency(incident.severity),
        "category": incident.category.as_str(),
        "contact_type": "monitoring",
        "assignment_group": assignment_group(incident.category),
        "u_affected_services": incident.affected_services.join(", "),
        "u_external_reference": incident.id.0,
    })
}

fn ticket_description(incident: &Incident) -> String {
    let mut parts = vec![
        incident.description.clone(),
        String::new(),
        "--- Auto-generated by Workflow Choreographer ---".to_string(),
        format!("Internal ID: {}", incident.id),
        format!("Source: {}", incident.source_system),
        format!("Detected at: {}", incident.detected_at.to_rfc3339()),
    ];
    if !incident.affected_services.is_empty() {
        parts.push(format!("Affected Services: {}", incident.affected_services.join(", ")));
    }
    if !incident.affected_components.is_empty() {
        parts.push(format!(
            "Affected Components: {}",
            incident.affected_components.join(", ")
        ));
    }
    if !incident.tags.is_empty() {
        parts.push(format!("Tags: {}", incident.tags.join(", ")));
    }
    parts.join("\n")
}

fn impact(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 1,
        Severity::High => 2,
        Severity::Medium => 3,
        Severity::Low => 4,
    }
}

fn urgency(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 1,
        Severity::High | Severity::Medium => 2,
        Severity::Low => 3,
    }
}

fn assignment_group(category: Category) -> &'static str {
    match category {
        Category::Infrastructure => "Platform Engineering",
        Category::Database => "Database Administration",
        Category::Security => "Security Operations",
        Category::Network => "Network Operations",
        Category::Application => "Application Support",
        Category::Performance => "Performance Engineering",
        Category::Unknown => "IT Support",
    }
}

fn demo_ticket(incident: &Incident) -> Ticket {
    let number = format!("INC{}", &incident.id.short().to_uppercase());
    Ticket {
        ticket_url: format!("https://demo.service-now.com/incident/{}", number),
        ticket_id: number,
        priority: incident.severity.priority().to_string(),
    }
}
