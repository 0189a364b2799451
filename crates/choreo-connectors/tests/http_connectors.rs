use choreo_connectors::config::{
    ConfluenceConfig, GitHubConfig, JiraConfig, ServiceNowConfig, SlackConfig, WatsonxConfig,
};
use choreo_connectors::{
    build_collaborators, ConfluenceClient, ConnectorConfig, GitHubClient, JiraClient,
    ServiceNowClient, SlackClient, WatsonxAnalyzer,
};
use choreo_core::domain::output::{Confidence, Diagnostics};
use choreo_core::domain::events::testing::RecordingPublisher;
use choreo_core::domain::repository::memory::{MemoryIncidentRepository, MemoryWorkflowRepository};
use choreo_core::{
    AiAnalyzer, Category, Chat, CodeHost, CoreError, EngineSettings, Incident, IssueTracker,
    RuntimeInterface, Severity, StepResult, StepStatus, TeamMember, Ticketing, Wiki,
    WorkflowInputs, WorkflowStatus,
};
use pretty_assertions::assert_eq;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn incident() -> Incident {
    Incident::new(
        "Primary database connection failures",
        "Application servers cannot reach the primary PostgreSQL instance",
        Severity::Critical,
        Category::Database,
    )
    .with_services(["orders-api"])
}

fn collaborator_error(err: CoreError) -> String {
    match err {
        CoreError::CollaboratorError(msg) => msg,
        other => panic!("expected collaborator error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_servicenow_creates_ticket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/now/table/incident"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "impact": 1, "urgency": 1, "category": "database" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": { "number": "INC0010042", "sys_id": "abc123" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ServiceNowConfig {
        instance: Some(server.uri()),
        username: Some("bot".to_string()),
        password: Some("secret".to_string()),
    };
    let outcome = ServiceNowClient::new(config, true, Client::new())
        .create_ticket(&incident())
        .await
        .unwrap();

    assert!(outcome.note.is_none());
    assert_eq!(outcome.value.ticket_id, "INC0010042");
    assert_eq!(outcome.value.priority, "P1");
    assert_eq!(
        outcome.value.ticket_url,
        format!("{}/nav_to.do?uri=incident.do?sys_id=abc123", server.uri())
    );
}

#[tokio::test]
async fn test_servicenow_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = ServiceNowConfig {
        instance: Some(server.uri()),
        username: Some("bot".to_string()),
        password: Some("secret".to_string()),
    };
    let err = ServiceNowClient::new(config, true, Client::new())
        .create_ticket(&incident())
        .await
        .unwrap_err();
    assert_eq!(collaborator_error(err), "servicenow returned 500: boom");
}

fn slack_config(server: &MockServer) -> SlackConfig {
    SlackConfig {
        bot_token: Some("xoxb-test".to_string()),
        incident_channel: "#ops-alerts".to_string(),
        api_url: server.uri(),
    }
}

#[tokio::test]
async fn test_slack_creates_channel_and_posts_alert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations.create"))
        .and(header("authorization", "Bearer xoxb-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": "C0123", "name": "inc-abc-primary-database" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .and(body_partial_json(json!({ "channel": "#ops-alerts" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1.2" })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = SlackClient::new(slack_config(&server), true, Client::new())
        .send_alert(&incident())
        .await
        .unwrap();

    assert_eq!(outcome.value.channel_id, "C0123");
    assert_eq!(outcome.value.channel_name, "inc-abc-primary-database");
    assert_eq!(outcome.value.alert_channel, "#ops-alerts");
}

#[tokio::test]
async fn test_slack_api_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations.create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "invalid_auth"
        })))
        .mount(&server)
        .await;

    let err = SlackClient::new(slack_config(&server), true, Client::new())
        .send_alert(&incident())
        .await
        .unwrap_err();
    assert_eq!(collaborator_error(err), "slack returned 200: invalid_auth");
}

fn github_config(server: &MockServer) -> GitHubConfig {
    GitHubConfig {
        token: Some("ghp_test".to_string()),
        org: Some("acme".to_string()),
        api_url: server.uri(),
    }
}

#[tokio::test]
async fn test_github_gathers_diagnostics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/main-app/commits"))
        .and(query_param("per_page", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "sha": "0123456789abcdef",
                "html_url": "https://github.com/acme/main-app/commit/0123456",
                "commit": {
                    "message": "Lower pool size\n\nDetails",
                    "author": { "name": "dev", "date": "2024-05-01T10:00:00Z" }
                }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/main-app/deployments"))
        .and(query_param("environment", "production"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "environment": "production", "ref": "v1.2.3", "created_at": "2024-05-01T11:00:00Z" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/main-app/actions/runs"))
        .and(query_param("status", "failure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [ { "name": "ci", "html_url": "https://github.com/acme/main-app/actions/runs/1" } ]
        })))
        .mount(&server)
        .await;
    // pull requests unavailable: best effort
    Mock::given(method("GET"))
        .and(path("/repos/acme/main-app/pulls"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let outcome = GitHubClient::new(github_config(&server), true, Client::new())
        .gather_diagnostics(&incident(), &[])
        .await
        .unwrap();

    let diagnostics = outcome.value;
    assert!(outcome.note.is_none());
    assert_eq!(diagnostics.commits.len(), 1);
    assert_eq!(diagnostics.commits[0].sha, "01234567");
    assert_eq!(diagnostics.commits[0].message, "Lower pool size");
    assert_eq!(diagnostics.deployments[0].git_ref, "v1.2.3");
    assert_eq!(diagnostics.failed_runs[0].name, "ci");
    assert!(diagnostics.pull_requests.is_empty());
}

#[tokio::test]
async fn test_github_commit_failure_fails_step() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let err = GitHubClient::new(github_config(&server), true, Client::new())
        .gather_diagnostics(&incident(), &["acme/payments".to_string()])
        .await
        .unwrap_err();
    assert_eq!(collaborator_error(err), "github returned 401: Bad credentials");
}

#[tokio::test]
async fn test_github_creates_issue_in_first_repository() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/payments/issues"))
        .and(body_partial_json(json!({
            "title": "[INCIDENT] Primary database connection failures",
            "labels": ["incident", "severity:critical", "database"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 88,
            "html_url": "https://github.com/acme/payments/issues/88"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repos = vec!["acme/payments".to_string(), "acme/web".to_string()];
    let outcome = GitHubClient::new(github_config(&server), true, Client::new())
        .create_issue(&incident(), &repos)
        .await
        .unwrap();
    assert_eq!(outcome.value.issue_number, 88);
}

#[tokio::test]
async fn test_watsonx_generates_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "iam-token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ml/v1/text/generation"))
        .and(query_param("version", "2023-05-29"))
        .and(header("authorization", "Bearer iam-token"))
        .and(body_partial_json(json!({ "project_id": "proj-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "generated_text": "HYPOTHESIS: Pool exhausted after config change.\nCONFIDENCE: high\nNEXT STEPS:\n- Revert config"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = WatsonxConfig {
        api_key: Some("key".to_string()),
        project_id: Some("proj-1".to_string()),
        url: server.uri(),
        iam_url: format!("{}/identity/token", server.uri()),
        ..Default::default()
    };
    let outcome = WatsonxAnalyzer::new(config, Client::new())
        .analyze_root_cause(&incident(), Some(&Diagnostics::default()))
        .await
        .unwrap();

    let analysis = outcome.value;
    assert_eq!(analysis.root_cause, "Pool exhausted after config change.");
    assert_eq!(analysis.confidence, Confidence::High);
    assert_eq!(analysis.immediate_actions, vec!["Revert config".to_string()]);
    assert_eq!(analysis.estimated_time_to_resolve, "1-2 hours");
    assert_eq!(
        analysis.recommendations,
        vec!["Check database connection pools and recent schema changes".to_string()]
    );
}

#[tokio::test]
async fn test_confluence_creates_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/content"))
        .and(body_partial_json(json!({ "type": "page", "space": { "key": "OPS" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "98765" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ConfluenceConfig {
        url: Some(server.uri()),
        username: Some("bot@example.com".to_string()),
        api_token: Some("token".to_string()),
        space_key: "OPS".to_string(),
    };
    let inc = incident();
    let outcome = ConfluenceClient::new(config, true, Client::new())
        .create_page(&inc, None, None)
        .await
        .unwrap();

    assert_eq!(outcome.value.page_id, "98765");
    assert_eq!(outcome.value.page_url, format!("{}/spaces/OPS/pages/98765", server.uri()));
    assert!(outcome.value.title.ends_with(&inc.title));
}

fn jira_config(server: &MockServer) -> JiraConfig {
    JiraConfig {
        url: Some(server.uri()),
        username: Some("bot@example.com".to_string()),
        api_token: Some("token".to_string()),
        project_key: "OPS".to_string(),
    }
}

fn team() -> Vec<TeamMember> {
    vec![
        TeamMember {
            id: "u-1".to_string(),
            name: "Grace".to_string(),
            email: Some("grace@example.com".to_string()),
            skills: vec!["frontend".to_string()],
            on_call: false,
        },
        TeamMember {
            id: "u-2".to_string(),
            name: "Edsger".to_string(),
            email: Some("edsger@example.com".to_string()),
            skills: vec!["postgresql".to_string()],
            on_call: false,
        },
    ]
}

#[tokio::test]
async fn test_jira_creates_and_assigns_issue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/2/issue"))
        .and(body_partial_json(json!({ "fields": { "priority": { "name": "Highest" } } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "1", "key": "OPS-12" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/user/search"))
        .and(query_param("query", "edsger@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "accountId": "acc-2" }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/rest/api/2/issue/OPS-12/assignee"))
        .and(body_partial_json(json!({ "accountId": "acc-2" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = JiraClient::new(jira_config(&server), Client::new())
        .assign_and_notify(&incident(), &team())
        .await
        .unwrap();

    assert_eq!(outcome.value.issue_key, "OPS-12");
    assert_eq!(outcome.value.issue_url, format!("{}/browse/OPS-12", server.uri()));
    assert_eq!(outcome.value.assignee.as_deref(), Some("Edsger"));
    assert_eq!(outcome.value.assignee_id.as_deref(), Some("u-2"));
}

#[tokio::test]
async fn test_jira_unknown_user_still_reports_assignee() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/2/issue"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "key": "OPS-13" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/user/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let outcome = JiraClient::new(jira_config(&server), Client::new())
        .assign_and_notify(&incident(), &team())
        .await
        .unwrap();
    assert_eq!(outcome.value.issue_key, "OPS-13");
    assert_eq!(outcome.value.assignee.as_deref(), Some("Edsger"));
}

#[tokio::test]
async fn test_unconfigured_connectors_run_the_whole_workflow_in_demo_mode() {
    let config = ConnectorConfig::from_lookup(|key| match key {
        "GITHUB_ORG" => Some("acme".to_string()),
        "ENABLE_CONFLUENCE_DOCS" => Some("false".to_string()),
        _ => None,
    })
    .unwrap();
    let runtime = RuntimeInterface::new(
        Arc::new(MemoryWorkflowRepository::new()),
        Arc::new(MemoryIncidentRepository::new()),
        Arc::new(RecordingPublisher::new()),
        build_collaborators(&config).unwrap(),
        EngineSettings::default(),
    );

    let inputs = WorkflowInputs {
        team_members: team(),
        ..Default::default()
    };
    let workflow = runtime.run_workflow(incident(), inputs).await.unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Completed));

    let notes: Vec<Option<String>> = workflow
        .steps
        .iter()
        .map(|s| match &s.result {
            Some(StepResult::Success { note, .. }) => note.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(notes[0].as_deref(), Some("demo mode: ServiceNow not configured"));
    assert_eq!(notes[4].as_deref(), Some("confluence docs disabled"));
    // monitoring has no external dependency
    assert_eq!(notes[6], None);

    let stored = runtime.get_incident(&workflow.incident_id).await.unwrap();
    assert!(stored.ticket_id.is_some());
    assert_eq!(stored.assignee.as_deref(), Some("Edsger"));
    assert!(stored.root_cause.unwrap().contains("Connection pool"));
}
