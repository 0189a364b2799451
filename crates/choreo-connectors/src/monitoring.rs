//! Monitoring hookup; builds the dashboard link and tracking map locally

use async_trait::async_trait;
use choreo_core::domain::output::MonitoringSetup;
use choreo_core::{Incident, Monitoring, Outcome};
use std::collections::BTreeMap;
use tracing::info;

/// Links the incident to the monitoring dashboard
#[derive(Debug, Clone)]
pub struct MonitoringHook {
    dashboard_url: String,
}

impl MonitoringHook {
    /// Create a hook for dashboards under `dashboard_url`
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        Self {
            dashboard_url: dashboard_url.into(),
        }
    }
}

/// Which integrations already reference the incident
pub fn tracking(incident: &Incident) -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("servicenow".to_string(), incident.ticket_id.is_some()),
        ("slack".to_string(), incident.chat_channel_id.is_some()),
        ("confluence".to_string(), incident.wiki_page_id.is_some()),
        ("jira".to_string(), incident.tracker_issue_key.is_some()),
    ])
}

#[async_trait]
impl Monitoring for MonitoringHook {
    async fn setup(&self, incident: &Incident) -> Outcome<MonitoringSetup> {
        let dashboard_url = format!("{}/{}", self.dashboard_url.trim_end_matches('/'), incident.id);
        info!(incident_id = %incident.id, dashboard = %dashboard_url, "Monitoring enabled");
        Outcome::live(MonitoringSetup {
            monitoring_enabled: true,
            dashboard_url,
            tracking: tracking(incident),
        })
    }
}
