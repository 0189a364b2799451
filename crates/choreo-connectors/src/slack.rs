//! Slack chat connector (Web API)

use async_trait::async_trait;
use choreo_core::domain::output::ChatAlert;
use choreo_core::{Chat, CoreResult, Incident, Outcome, Severity};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SlackConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{read_json, str_field};

const SERVICE: &str = "slack";

/// Slack caps channel names at 80 characters
const MAX_CHANNEL_NAME: usize = 80;

/// Opens the incident channel and broadcasts the alert
#[derive(Debug, Clone)]
pub struct SlackClient {
    config: SlackConfig,
    enabled: bool,
    client: Client,
}

impl SlackClient {
    /// Create a new client; `enabled` is the notifications feature flag
    pub fn new(config: SlackConfig, enabled: bool, client: Client) -> Self {
        Self {
            config,
            enabled,
            client,
        }
    }

    async fn call(&self, token: &str, method: &str, body: Value) -> ConnectorResult<Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.config.api_url.trim_end_matches('/'), method))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;

        let body = read_json(SERVICE, response).await?;
        if body["ok"].as_bool() != Some(true) {
            return Err(ConnectorError::Api {
                service: SERVICE,
                status: 200,
                body: body["error"].as_str().unwrap_or("unknown_error").to_string(),
            });
        }
        debug!(method, "Slack call succeeded");
        Ok(body)
    }
}

#[async_trait]
impl Chat for SlackClient {
    async fn send_alert(&self, incident: &Incident) -> CoreResult<Outcome<ChatAlert>> {
        let channel_name = channel_name(incident);
        if !self.enabled {
            return Ok(Outcome::demo(
                self.demo_alert(channel_name),
                "slack notifications disabled",
            ));
        }
        let token = match self.config.bot_token.as_deref() {
            Some(token) => token,
            None => {
                warn!(incident_id = %incident.id, "Slack not configured, using demo channel");
                return Ok(Outcome::demo(
                    self.demo_alert(channel_name),
                    "demo mode: Slack not configured",
                ));
            }
        };

        let created = self
            .call(
                token,
                "conversations.create",
                json!({ "name": channel_name, "is_private": false }),
            )
            .await?;
        let channel_id = str_field(SERVICE, &created, "/channel/id")?;
        let channel_name = created["channel"]["name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(channel_name);

        self.call(
            token,
            "chat.postMessage",
            json!({
                "channel": self.config.incident_channel,
                "text": alert_text(incident, &channel_id),
                "unfurl_links": false,
            }),
        )
        .await?;

        info!(
            incident_id = %incident.id,
            channel_id = %channel_id,
            alert_channel = %self.config.incident_channel,
            "Slack alert sent"
        );
        Ok(Outcome::live(ChatAlert {
            channel_id,
            channel_name,
            alert_channel: self.config.incident_channel.clone(),
        }))
    }
}

impl SlackClient {
    fn demo_alert(&self, channel_name: String) -> ChatAlert {
        ChatAlert {
            channel_id: format!("CDEMO{}", channel_name.len()),
            channel_name,
            alert_channel: self.config.incident_channel.clone(),
        }
    }
}

/// `inc-<short id>-<title slug>`, lower case, within Slack's length limit
pub fn channel_name(incident: &Incident) -> String {
    let prefix = format!("inc-{}-", incident.id.short().to_lowercase());
    let slug = incident.slug(MAX_CHANNEL_NAME.saturating_sub(prefix.len()));
    if slug.is_empty() {
        prefix.trim_end_matches('-').to_string()
    } else {
        format!("{}{}", prefix, slug)
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => ":red_circle:",
        Severity::High => ":large_orange_circle:",
        Severity::Medium => ":large_yellow_circle:",
        Severity::Low => ":large_green_circle:",
    }
}

/// Severity-prefixed alert posted to the incident channel
pub fn alert_text(incident: &Incident, channel_id: &str) -> String {
    let services = if incident.affected_services.is_empty() {
        "TBD".to_string()
    } else {
        incident.affected_services.join(", ")
    };
    let description: String = incident.description.chars().take(500).collect();
    format!(
        "{} *{} INCIDENT DETECTED*\n\n*Title:* {}\n*Category:* {}\n*Affected Services:* {}\n\n*Description:*\n{}\n\n:clipboard: Ticket: {}\n:speech_balloon: Incident Channel: <#{}>",
        severity_marker(incident.severity),
        incident.severity.as_str().to_uppercase(),
        incident.title,
        incident.category.as_str(),
        services,
        description,
        incident.ticket_id.as_deref().unwrap_or("Creating..."),
        channel_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::{Category, IncidentId};

    fn incident() -> Incident {
        let mut incident = Incident::new(
            "Redis cluster failover loop!",
            "Sentinels keep electing a new primary",
            Severity::Critical,
            Category::Database,
        );
        incident.id = IncidentId("INC-0A1B2C3D4E5F".to_string());
        incident
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name(&incident()), "inc-2c3d4e5f-redis-cluster-failover-loop");
    }

    #[test]
    fn test_channel_name_is_bounded() {
        let mut inc = incident();
        inc.title = "x".repeat(200);
        assert!(channel_name(&inc).len() <= MAX_CHANNEL_NAME);
    }

    #[test]
    fn test_alert_text_is_severity_prefixed() {
        let mut inc = incident();
        inc.ticket_id = Some("INC0012345".to_string());
        let text = alert_text(&inc, "C123");
        assert!(text.starts_with(":red_circle: *CRITICAL INCIDENT DETECTED*"));
        assert!(text.contains("*Affected Services:* TBD"));
        assert!(text.contains("Ticket: INC0012345"));
        assert!(text.ends_with("<#C123>"));
    }
}
