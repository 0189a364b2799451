//! Configuration for the connectors
//!
//! Loaded from environment variables. A tool with missing credentials is
//! not an error: its connector answers with synthetic data instead.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::error::{ConnectorError, ConnectorResult};

/// ServiceNow configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNowConfig {
    /// Instance name (`acme`) or full base URL
    #[serde(default)]
    pub instance: Option<String>,
    /// API user
    #[serde(default)]
    pub username: Option<String>,
    /// API password
    #[serde(default)]
    pub password: Option<String>,
}

impl ServiceNowConfig {
    /// All credentials present
    pub fn is_configured(&self) -> bool {
        self.instance.is_some() && self.username.is_some() && self.password.is_some()
    }

    /// Base URL of the instance
    pub fn base_url(&self) -> Option<String> {
        self.instance.as_ref().map(|instance| {
            if instance.starts_with("http://") || instance.starts_with("https://") {
                instance.trim_end_matches('/').to_string()
            } else {
                format!("https://{}.service-now.com", instance)
            }
        })
    }
}

/// Slack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Channel every alert is broadcast to
    #[serde(default = "default_incident_channel")]
    pub incident_channel: String,
    /// Web API base URL
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

impl SlackConfig {
    /// Bot token present
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            incident_channel: default_incident_channel(),
            api_url: default_slack_api_url(),
        }
    }
}

/// GitHub configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access or app token
    #[serde(default)]
    pub token: Option<String>,
    /// Organisation used for the default repository
    #[serde(default)]
    pub org: Option<String>,
    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

impl GitHubConfig {
    /// Token present
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Repositories to analyse: the given ones, else `<org>/main-app`
    pub fn repositories(&self, requested: &[String]) -> Vec<String> {
        if !requested.is_empty() {
            return requested.to_vec();
        }
        let org = self.org.as_deref().unwrap_or("org");
        vec![format!("{}/main-app", org)]
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            org: None,
            api_url: default_github_api_url(),
        }
    }
}

/// IBM watsonx configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatsonxConfig {
    /// IBM Cloud API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// watsonx project
    #[serde(default)]
    pub project_id: Option<String>,
    /// Regional endpoint
    #[serde(default = "default_watsonx_url")]
    pub url: String,
    /// IAM token endpoint
    #[serde(default = "default_iam_url")]
    pub iam_url: String,
    /// Foundation model used for analysis
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

impl WatsonxConfig {
    /// Key and project present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.project_id.is_some()
    }
}

impl Default for WatsonxConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            url: default_watsonx_url(),
            iam_url: default_iam_url(),
            model_id: default_model_id(),
        }
    }
}

/// Confluence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Site URL, e.g. `https://acme.atlassian.net/wiki`
    #[serde(default)]
    pub url: Option<String>,
    /// Atlassian account
    #[serde(default)]
    pub username: Option<String>,
    /// Atlassian API token
    #[serde(default)]
    pub api_token: Option<String>,
    /// Space incident pages are created in
    #[serde(default = "default_space_key")]
    pub space_key: String,
}

impl ConfluenceConfig {
    /// All credentials present
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.username.is_some() && self.api_token.is_some()
    }
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            api_token: None,
            space_key: default_space_key(),
        }
    }
}

/// Jira configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Site URL
    #[serde(default)]
    pub url: Option<String>,
    /// Atlassian account
    #[serde(default)]
    pub username: Option<String>,
    /// Atlassian API token
    #[serde(default)]
    pub api_token: Option<String>,
    /// Project incident issues are created in
    #[serde(default = "default_project_key")]
    pub project_key: String,
}

impl JiraConfig {
    /// All credentials present
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.username.is_some() && self.api_token.is_some()
    }
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            api_token: None,
            project_key: default_project_key(),
        }
    }
}

/// Feature toggles; a disabled feature answers with synthetic data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// ServiceNow ticket creation
    #[serde(default = "enabled")]
    pub auto_ticketing: bool,
    /// Slack channel and alert
    #[serde(default = "enabled")]
    pub slack_notifications: bool,
    /// Confluence incident page
    #[serde(default = "enabled")]
    pub confluence_docs: bool,
    /// GitHub diagnostics and issue
    #[serde(default = "enabled")]
    pub github_analysis: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_ticketing: true,
            slack_notifications: true,
            confluence_docs: true,
            github_analysis: true,
        }
    }
}

/// Full connector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// ServiceNow
    #[serde(default)]
    pub servicenow: ServiceNowConfig,
    /// Slack
    #[serde(default)]
    pub slack: SlackConfig,
    /// GitHub
    #[serde(default)]
    pub github: GitHubConfig,
    /// watsonx
    #[serde(default)]
    pub watsonx: WatsonxConfig,
    /// Confluence
    #[serde(default)]
    pub confluence: ConfluenceConfig,
    /// Jira
    #[serde(default)]
    pub jira: JiraConfig,
    /// Base of the per-incident dashboard links
    #[serde(default = "default_dashboard_url")]
    pub monitoring_dashboard_url: String,
    /// Feature toggles
    #[serde(default)]
    pub features: FeatureFlags,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_incident_channel() -> String {
    "#incident-response".to_string()
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_watsonx_url() -> String {
    "https://us-south.ml.cloud.ibm.com".to_string()
}

fn default_iam_url() -> String {
    "https://iam.cloud.ibm.com/identity/token".to_string()
}

fn default_model_id() -> String {
    "ibm/granite-13b-instruct-v2".to_string()
}

fn default_space_key() -> String {
    "INCIDENTS".to_string()
}

fn default_project_key() -> String {
    "INC".to_string()
}

fn default_dashboard_url() -> String {
    "https://monitoring.example.com/incidents".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn enabled() -> bool {
    true
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            servicenow: ServiceNowConfig::default(),
            slack: SlackConfig::default(),
            github: GitHubConfig::default(),
            watsonx: WatsonxConfig::default(),
            confluence: ConfluenceConfig::default(),
            jira: JiraConfig::default(),
            monitoring_dashboard_url: default_dashboard_url(),
            features: FeatureFlags::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ConnectorResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> ConnectorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.servicenow.instance = var("SERVICENOW_INSTANCE");
        config.servicenow.username = var("SERVICENOW_USERNAME");
        config.servicenow.password = var("SERVICENOW_PASSWORD");

        config.slack.bot_token = var("SLACK_BOT_TOKEN");
        if let Some(channel) = var("SLACK_INCIDENT_CHANNEL") {
            config.slack.incident_channel = channel;
        }
        if let Some(url) = var("SLACK_API_URL") {
            config.slack.api_url = url;
        }

        config.github.token = var("GITHUB_TOKEN");
        config.github.org = var("GITHUB_ORG");
        if let Some(url) = var("GITHUB_API_URL") {
            config.github.api_url = url;
        }

        config.watsonx.api_key = var("WATSONX_API_KEY");
        config.watsonx.project_id = var("WATSONX_PROJECT_ID");
        if let Some(url) = var("WATSONX_URL") {
            config.watsonx.url = url;
        }
        if let Some(url) = var("WATSONX_IAM_URL") {
            config.watsonx.iam_url = url;
        }
        if let Some(model) = var("WATSONX_MODEL_ID") {
            config.watsonx.model_id = model;
        }

        config.confluence.url = var("CONFLUENCE_URL");
        config.confluence.username = var("CONFLUENCE_USERNAME");
        config.confluence.api_token = var("CONFLUENCE_API_TOKEN");
        if let Some(space) = var("CONFLUENCE_SPACE_KEY") {
            config.confluence.space_key = space;
        }

        config.jira.url = var("JIRA_URL");
        config.jira.username = var("JIRA_USERNAME");
        config.jira.api_token = var("JIRA_API_TOKEN");
        if let Some(project) = var("JIRA_PROJECT_KEY") {
            config.jira.project_key = project;
        }

        if let Some(url) = var("MONITORING_DASHBOARD_URL") {
            config.monitoring_dashboard_url = url;
        }

        config.features.auto_ticketing = flag(var("ENABLE_AUTO_TICKETING"), true);
        config.features.slack_notifications = flag(var("ENABLE_SLACK_NOTIFICATIONS"), true);
        config.features.confluence_docs = flag(var("ENABLE_CONFLUENCE_DOCS"), true);
        config.features.github_analysis = flag(var("ENABLE_GITHUB_ANALYSIS"), true);

        if let Some(timeout) = var("CONNECTOR_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                config.timeout_secs = secs;
            } else {
                warn!("Invalid CONNECTOR_TIMEOUT_SECS value: {}", timeout);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values no connector can work with
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.timeout_secs == 0 {
            return Err(ConnectorError::Configuration(
                "CONNECTOR_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}
