//! HTTP collaborators for the choreography engine
//!
//! One client per external tool, each implementing the matching port from
//! `choreo-core`. Clients without credentials, or whose feature flag is
//! off, answer with synthetic data and a note instead of failing, so a run
//! always walks all seven steps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use choreo_core::Collaborators;
use std::sync::Arc;
use tracing::info;

pub mod analysis;
pub mod config;
pub mod confluence;
pub mod error;
pub mod github;
mod http;
pub mod jira;
pub mod monitoring;
pub mod servicenow;
pub mod slack;
pub mod watsonx;

pub use config::{ConnectorConfig, FeatureFlags};
pub use confluence::ConfluenceClient;
pub use error::{ConnectorError, ConnectorResult};
pub use github::GitHubClient;
pub use jira::JiraClient;
pub use monitoring::MonitoringHook;
pub use servicenow::ServiceNowClient;
pub use slack::SlackClient;
pub use watsonx::WatsonxAnalyzer;

/// Build the full collaborator set from configuration
pub fn build_collaborators(config: &ConnectorConfig) -> ConnectorResult<Collaborators> {
    config.validate()?;
    let client = http::build_client(config.timeout())?;

    info!(
        servicenow = config.servicenow.is_configured(),
        slack = config.slack.is_configured(),
        github = config.github.is_configured(),
        watsonx = config.watsonx.is_configured(),
        confluence = config.confluence.is_configured(),
        jira = config.jira.is_configured(),
        "Connectors configured"
    );

    Ok(Collaborators {
        ticketing: Arc::new(ServiceNowClient::new(
            config.servicenow.clone(),
            config.features.auto_ticketing,
            client.clone(),
        )),
        chat: Arc::new(SlackClient::new(
            config.slack.clone(),
            config.features.slack_notifications,
            client.clone(),
        )),
        code_host: Arc::new(GitHubClient::new(
            config.github.clone(),
            config.features.github_analysis,
            client.clone(),
        )),
        ai: Arc::new(WatsonxAnalyzer::new(config.watsonx.clone(), client.clone())),
        wiki: Arc::new(ConfluenceClient::new(
            config.confluence.clone(),
            config.features.confluence_docs,
            client.clone(),
        )),
        issue_tracker: Arc::new(JiraClient::new(config.jira.clone(), client)),
        monitoring: Arc::new(MonitoringHook::new(config.monitoring_dashboard_url.clone())),
    })
}
