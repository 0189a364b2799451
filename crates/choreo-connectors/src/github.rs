//! GitHub code-host connector (REST API)
//!
//! Diagnostics are collected per repository. Commits are required; the
//! deployment, CI-run and pull-request listings are best effort and an
//! error there only drops that part of the report.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use choreo_core::domain::output::{
    CodeIssue, Commit, Deployment, Diagnostics, FailedRun, PullRequest,
};
use choreo_core::{Category, CodeHost, CoreResult, Incident, Outcome};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::GitHubConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::read_json;

const SERVICE: &str = "github";

const MAX_COMMITS: usize = 10;
const MAX_DEPLOYMENTS: usize = 5;
const MAX_FAILED_RUNS: usize = 5;

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiDeployment {
    id: u64,
    environment: String,
    #[serde(rename = "ref")]
    git_ref: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiRuns {
    #[serde(default)]
    workflow_runs: Vec<ApiRun>,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    name: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    html_url: String,
}

/// Collects diagnostics from GitHub and opens tracking issues
#[derive(Debug, Clone)]
pub struct GitHubClient {
    config: GitHubConfig,
    enabled: bool,
    client: Client,
}

impl GitHubClient {
    /// Create a new client; `enabled` is the GitHub analysis feature flag
    pub fn new(config: GitHubConfig, enabled: bool, client: Client) -> Self {
        Self {
            config,
            enabled,
            client,
        }
    }

    fn demo_note(&self) -> Option<&'static str> {
        if !self.enabled {
            Some("github analysis disabled")
        } else if !self.config.is_configured() {
            Some("demo mode: GitHub not configured")
        } else {
            None
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match self.config.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ConnectorResult<T> {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let response = self
            .request(self.client.get(url).query(query))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        serde_json::from_value(body).map_err(|e| ConnectorError::decode(SERVICE, e.to_string()))
    }

    async fn commits(&self, repo: &str, since: DateTime<Utc>) -> ConnectorResult<Vec<Commit>> {
        let commits: Vec<ApiCommit> = self
            .get(
                &format!("/repos/{}/commits", repo),
                &[
                    ("since", since.to_rfc3339()),
                    ("per_page", MAX_COMMITS.to_string()),
                ],
            )
            .await?;

        Ok(commits
            .into_iter()
            .take(MAX_COMMITS)
            .map(|c| Commit {
                repository: repo.to_string(),
                sha: c.sha.chars().take(8).collect(),
                message: c.commit.message.lines().next().unwrap_or_default().to_string(),
                author: c
                    .commit
                    .author
                    .as_ref()
                    .and_then(|a| a.name.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                date: c.commit.author.and_then(|a| a.date),
                url: c.html_url,
            })
            .collect())
    }

    async fn deployments(&self, repo: &str) -> ConnectorResult<Vec<Deployment>> {
        let deployments: Vec<ApiDeployment> = self
            .get(
                &format!("/repos/{}/deployments", repo),
                &[
                    ("environment", "production".to_string()),
                    ("per_page", MAX_DEPLOYMENTS.to_string()),
                ],
            )
            .await?;

        Ok(deployments
            .into_iter()
            .take(MAX_DEPLOYMENTS)
            .map(|d| Deployment {
                repository: repo.to_string(),
                id: d.id,
                environment: d.environment,
                git_ref: d.git_ref,
                created_at: d.created_at,
            })
            .collect())
    }

    async fn failed_runs(&self, repo: &str) -> ConnectorResult<Vec<FailedRun>> {
        let runs: ApiRuns = self
            .get(
                &format!("/repos/{}/actions/runs", repo),
                &[
                    ("status", "failure".to_string()),
                    ("per_page", MAX_FAILED_RUNS.to_string()),
                ],
            )
            .await?;

        Ok(runs
            .workflow_runs
            .into_iter()
            .take(MAX_FAILED_RUNS)
            .map(|r| FailedRun {
                repository: repo.to_string(),
                name: r.name.unwrap_or_else(|| "workflow".to_string()),
                url: r.html_url,
            })
            .collect())
    }

    async fn open_pulls(&self, repo: &str) -> ConnectorResult<Vec<PullRequest>> {
        let pulls: Vec<ApiPull> = self
            .get(
                &format!("/repos/{}/pulls", repo),
                &[("state", "open".to_string()), ("per_page", "10".to_string())],
            )
            .await?;

        Ok(pulls
            .into_iter()
            .map(|p| PullRequest {
                repository: repo.to_string(),
                number: p.number,
                title: p.title,
                url: p.html_url,
            })
            .collect())
    }
}

/// Start of the commit window: 48h back for urgent incidents, 72h otherwise
pub fn commit_window_start(incident: &Incident, now: DateTime<Utc>) -> DateTime<Utc> {
    let hours = if incident.severity.is_urgent() { 48 } else { 72 };
    now - Duration::hours(hours)
}

fn best_effort<T>(repo: &str, what: &str, result: ConnectorResult<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(repository = %repo, error = %e, "Could not list {}", what);
        Vec::new()
    })
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn gather_diagnostics(
        &self,
        incident: &Incident,
        repositories: &[String],
    ) -> CoreResult<Outcome<Diagnostics>> {
        let repos = self.config.repositories(repositories);
        if let Some(note) = self.demo_note() {
            return Ok(Outcome::demo(demo_diagnostics(&repos), note));
        }

        let since = commit_window_start(incident, Utc::now());
        let mut diagnostics = Diagnostics::default();
        for repo in &repos {
            diagnostics.commits.extend(self.commits(repo, since).await?);
            diagnostics
                .deployments
                .extend(best_effort(repo, "deployments", self.deployments(repo).await));
            diagnostics
                .failed_runs
                .extend(best_effort(repo, "failed runs", self.failed_runs(repo).await));
            diagnostics
                .pull_requests
                .extend(best_effort(repo, "pull requests", self.open_pulls(repo).await));
        }

        info!(
            incident_id = %incident.id,
            repositories = repos.len(),
            commits = diagnostics.commits.len(),
            deployments = diagnostics.deployments.len(),
            failed_runs = diagnostics.failed_runs.len(),
            "GitHub diagnostics gathered"
        );
        Ok(Outcome::live(diagnostics))
    }

    async fn create_issue(
        &self,
        incident: &Incident,
        repositories: &[String],
    ) -> CoreResult<Outcome<CodeIssue>> {
        let repos = self.config.repositories(repositories);
        let repo = repos
            .first()
            .cloned()
            .unwrap_or_else(|| "org/main-app".to_string());
        if let Some(note) = self.demo_note() {
            return Ok(Outcome::demo(
                CodeIssue {
                    issue_number: 1,
                    issue_url: format!("https://github.com/{}/issues/1", repo),
                },
                note,
            ));
        }

        let url = format!("{}/repos/{}/issues", self.config.api_url.trim_end_matches('/'), repo);
        let response = self
            .request(self.client.post(url))
            .json(&json!({
                "title": format!("[INCIDENT] {}", incident.title),
                "body": issue_body(incident),
                "labels": issue_labels(incident),
            }))
            .send()
            .await
            .map_err(|e| ConnectorError::http(SERVICE, e))?;
        let body = read_json(SERVICE, response).await?;
        let issue: ApiIssue = serde_json::from_value(body)
            .map_err(|e| ConnectorError::decode(SERVICE, e.to_string()))?;

        info!(incident_id = %incident.id, repository = %repo, issue = issue.number, "GitHub issue created");
        Ok(Outcome::live(CodeIssue {
            issue_number: issue.number,
            issue_url: issue.html_url,
        }))
    }
}

/// Markdown body of the tracking issue
pub fn issue_body(incident: &Incident) -> String {
    let mut parts = vec![
        "## Incident Details".to_string(),
        String::new(),
        format!("**Severity:** {}", incident.severity.as_str().to_uppercase()),
        format!("**Category:** {}", incident.category.as_str()),
        format!("**Detected:** {}", incident.detected_at.to_rfc3339()),
        String::new(),
        "## Description".to_string(),
        String::new(),
        incident.description.clone(),
        String::new(),
    ];
    if !incident.affected_services.is_empty() {
        parts.push("## Affected Services".to_string());
        parts.push(String::new());
        parts.extend(incident.affected_services.iter().map(|s| format!("- {}", s)));
        parts.push(String::new());
    }
    parts.push("---".to_string());
    parts.push(format!("*Internal ID: {}*", incident.id));
    parts.join("\n")
}

/// `incident`, `severity:<level>` and the category unless unknown
pub fn issue_labels(incident: &Incident) -> Vec<String> {
    let mut labels = vec![
        "incident".to_string(),
        format!("severity:{}", incident.severity.as_str()),
    ];
    if incident.category != Category::Unknown {
        labels.push(incident.category.as_str().to_string());
    }
    labels
}

fn demo_diagnostics(repos: &[String]) -> Diagnostics {
    let now = Utc::now();
    let mut diagnostics = Diagnostics::default();
    for repo in repos {
        diagnostics.commits.push(Commit {
            repository: repo.clone(),
            sha: "d3m0c0de".to_string(),
            message: "Update connection pool configuration".to_string(),
            author: "demo-developer".to_string(),
            date: Some(now - Duration::hours(3)),
            url: None,
        });
        diagnostics.deployments.push(Deployment {
            repository: repo.clone(),
            id: 1,
            environment: "production".to_string(),
            git_ref: "main".to_string(),
            created_at: Some(now - Duration::hours(2)),
        });
    }
    diagnostics
}
