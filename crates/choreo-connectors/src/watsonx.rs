//! IBM watsonx root cause analyser

use async_trait::async_trait;
use choreo_core::domain::output::{Confidence, Diagnostics, RootCauseAnalysis};
use choreo_core::{AiAnalyzer, Category, CoreResult, Incident, Outcome, Severity};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::recommendations;
use crate::config::WatsonxConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{read_json, str_field};

const SERVICE: &str = "watsonx";
const API_VERSION: &str = "2023-05-29";
const MAX_PROMPT_COMMITS: usize = 10;

/// Generates root cause hypotheses with a watsonx foundation model
#[derive(Debug, Clone)]
pub struct WatsonxAnalyzer {
    config: WatsonxConfig,
    client: Client,
}

impl WatsonxAnalyzer {
    /// Create a new analyser
    pub fn new(config: WatsonxConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn access_token(&self, api_key: &str) -> ConnectorResult<String> {
        let response = self
            .client
            .post(&self.config.iam_url)
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", api_key),
            ])
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        str_field(SERVICE, &body, "/access_token")
    }

    async fn generate(&self, api_key: &str, project_id: &str, prompt: String) -> ConnectorResult<String> {
        let token = self.access_token(api_key).await?;
        let response = self
            .client
            .post(format!(
                "{}/ml/v1/text/generation",
                self.config.url.trim_end_matches('/')
            ))
            .query(&[("version", API_VERSION)])
            .bearer_auth(token)
            .json(&json!({
                "model_id": self.config.model_id,
                "project_id": project_id,
                "input": prompt,
                "parameters": {
                    "decoding_method": "greedy",
                    "max_new_tokens": 500,
                },
            }))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        let text = str_field(SERVICE, &body, "/results/0/generated_text")?;
        debug!(chars = text.len(), "watsonx generation received");
        Ok(text)
    }
}

#[async_trait]
impl AiAnalyzer for WatsonxAnalyzer {
    async fn analyze_root_cause(
        &self,
        incident: &Incident,
        diagnostics: Option<&Diagnostics>,
    ) -> CoreResult<Outcome<RootCauseAnalysis>> {
        let (api_key, project_id) = match (&self.config.api_key, &self.config.project_id) {
            (Some(key), Some(project)) => (key, project),
            _ => {
                warn!(incident_id = %incident.id, "watsonx not configured, using rule-based analysis");
                return Ok(Outcome::demo(
                    demo_analysis(incident, diagnostics),
                    "demo mode: watsonx not configured",
                ));
            }
        };

        let text = self
            .generate(api_key, project_id, build_prompt(incident, diagnostics))
            .await?;
        let parsed = parse_response(&text);
        info!(incident_id = %incident.id, confidence = ?parsed.confidence, "Root cause analysis completed");

        Ok(Outcome::live(RootCauseAnalysis {
            root_cause: parsed.hypothesis,
            contributing_factors: contributing_factors(diagnostics),
            confidence: parsed.confidence,
            immediate_actions: parsed.next_steps,
            recommendations: recommendations(incident, diagnostics),
            estimated_time_to_resolve: estimated_time_to_resolve(incident.severity).to_string(),
        }))
    }
}

/// Prompt for the text generation call
pub fn build_prompt(incident: &Incident, diagnostics: Option<&Diagnostics>) -> String {
    let services = if incident.affected_services.is_empty() {
        "Unknown".to_string()
    } else {
        incident.affected_services.join(", ")
    };

    let changes = match diagnostics {
        Some(d) if !d.commits.is_empty() => {
            let lines: Vec<String> = d
                .commits
                .iter()
                .take(MAX_PROMPT_COMMITS)
                .map(|c| {
                    let message: String = c.message.chars().take(100).collect();
                    format!("- {}: {} by {}", c.sha, message, c.author)
                })
                .collect();
            format!("RECENT CHANGES:\n{}", lines.join("\n"))
        }
        _ => "RECENT CHANGES:\nNo recent changes available".to_string(),
    };

    format!(
        "You are an expert Site Reliability Engineer performing root cause analysis.\n\n\
         INCIDENT DETAILS:\n\
         - Title: {}\n\
         - Description: {}\n\
         - Severity: {}\n\
         - Category: {}\n\
         - Affected Services: {}\n\n\
         {}\n\n\
         Based on this information, provide:\n\
         1. A concise root cause hypothesis (2-3 sentences)\n\
         2. Confidence level (low/medium/high)\n\
         3. Recommended investigation steps\n\n\
         Format your response as:\n\
         HYPOTHESIS: [Your hypothesis]\n\
         CONFIDENCE: [low/medium/high]\n\
         NEXT STEPS:\n\
         - [Step 1]\n\
         - [Step 2]\n\
         - [Step 3]",
        incident.title,
        incident.description,
        incident.severity.as_str(),
        incident.category.as_str(),
        services,
        changes,
    )
}

/// Sections extracted from the model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Hypothesis text
    pub hypothesis: String,
    /// Stated confidence, medium when absent
    pub confidence: Confidence,
    /// Bullet points under `NEXT STEPS:`
    pub next_steps: Vec<String>,
}

/// Parse `HYPOTHESIS:` / `CONFIDENCE:` / `NEXT STEPS:`; free text becomes the hypothesis
pub fn parse_response(text: &str) -> ParsedResponse {
    enum Section {
        Preamble,
        Hypothesis,
        Steps,
    }

    let mut hypothesis: Vec<&str> = Vec::new();
    let mut confidence = Confidence::Medium;
    let mut next_steps = Vec::new();
    let mut section = Section::Preamble;
    let mut saw_marker = false;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = strip_marker(line, "HYPOTHESIS:") {
            saw_marker = true;
            section = Section::Hypothesis;
            let first = rest.trim();
            if !first.is_empty() {
                hypothesis.push(first);
            }
        } else if let Some(rest) = strip_marker(line, "CONFIDENCE:") {
            confidence = match rest.trim().to_lowercase().as_str() {
                "high" => Confidence::High,
                "low" => Confidence::Low,
                _ => Confidence::Medium,
            };
            section = Section::Preamble;
        } else if strip_marker(line, "NEXT STEPS:").is_some() {
            section = Section::Steps;
        } else {
            match section {
                Section::Hypothesis if !line.is_empty() => hypothesis.push(line),
                Section::Steps => {
                    let step = line.trim_start_matches(['-', '*']).trim();
                    if !step.is_empty() {
                        next_steps.push(step.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    let hypothesis = if saw_marker {
        hypothesis.join(" ")
    } else {
        text.trim().to_string()
    };
    ParsedResponse {
        hypothesis,
        confidence,
        next_steps,
    }
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        line.get(marker.len()..)
    } else {
        None
    }
}

fn contributing_factors(diagnostics: Option<&Diagnostics>) -> Vec<String> {
    let Some(d) = diagnostics else {
        return vec!["No diagnostic data available".to_string()];
    };
    let mut factors = Vec::new();
    if !d.deployments.is_empty() {
        factors.push(format!("{} recent production deployment(s)", d.deployments.len()));
    }
    if !d.failed_runs.is_empty() {
        factors.push(format!("{} failed CI/CD run(s)", d.failed_runs.len()));
    }
    if !d.commits.is_empty() {
        factors.push(format!("{} commit(s) in the analysis window", d.commits.len()));
    }
    factors
}

/// Rough resolution estimate by severity
pub fn estimated_time_to_resolve(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "1-2 hours",
        Severity::High => "2-4 hours",
        Severity::Medium => "4-8 hours",
        Severity::Low => "1-2 days",
    }
}

fn demo_hypothesis(category: Category) -> &'static str {
    match category {
        Category::Database => {
            "Connection pool exhaustion following a recent configuration change is the most likely cause. Long-running queries are holding connections and new requests time out waiting."
        }
        Category::Infrastructure => {
            "Resource limits on the affected workloads appear too low after the last rollout. Pods are being OOM-killed and restarted, reducing available capacity."
        }
        Category::Network => {
            "A DNS or load balancer configuration change is routing traffic to unhealthy backends. Health checks are failing intermittently across regions."
        }
        Category::Security => {
            "Unusual authentication patterns suggest credential stuffing against the login endpoint. Rate limiting is not engaging for the affected clients."
        }
        Category::Application => {
            "A regression introduced in the most recent deployment is raising unhandled exceptions on a hot code path. Error rates rose immediately after the release."
        }
        Category::Performance => {
            "Latency increased after a dependency began responding slowly. Request queues are backing up and saturating worker threads."
        }
        Category::Unknown => {
            "Insufficient signal to isolate a single cause. Correlate the incident start time with recent deployments and configuration changes."
        }
    }
}

fn demo_analysis(incident: &Incident, diagnostics: Option<&Diagnostics>) -> RootCauseAnalysis {
    RootCauseAnalysis {
        root_cause: demo_hypothesis(incident.category).to_string(),
        contributing_factors: contributing_factors(diagnostics),
        confidence: Confidence::Medium,
        immediate_actions: vec![
            "Review the most recent deployment and configuration changes".to_string(),
            "Check error rates and saturation for the affected services".to_string(),
            "Prepare a rollback plan".to_string(),
        ],
        recommendations: recommendations(incident, diagnostics),
        estimated_time_to_resolve: estimated_time_to_resolve(incident.severity).to_string(),
    }
}
