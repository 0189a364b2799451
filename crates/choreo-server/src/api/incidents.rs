//! Incident endpoints
//!
//! Reporting an incident always starts a workflow run in the background;
//! the response carries the run summary so callers can poll it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use choreo_core::{
    Category, Incident, IncidentId, Severity, TeamMember, WorkflowInputs, WorkflowSummary,
    STEP_CATALOGUE,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::errors::ApiError;
use super::AppState;

const MIN_TITLE_LEN: usize = 5;
const MIN_DESCRIPTION_LEN: usize = 10;

/// Responder as accepted on the wire; missing fields get placeholders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamMemberRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub on_call: bool,
}

/// Body of `POST /incident` and `POST /orchestrate/incident-workflow`
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub team_members: Vec<TeamMemberRequest>,
}

impl IncidentRequest {
    /// Check field lengths
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().chars().count() < MIN_TITLE_LEN {
            return Err(ApiError::BadRequest(format!(
                "title must be at least {} characters",
                MIN_TITLE_LEN
            )));
        }
        if self.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
            return Err(ApiError::BadRequest(format!(
                "description must be at least {} characters",
                MIN_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }

    /// Build the incident and run inputs, falling back to defaults on unknown enum values
    pub fn into_parts(self, default_source: &str) -> (Incident, WorkflowInputs) {
        let severity = parse_or(self.severity.as_deref(), Severity::Medium, "severity");
        let category = parse_or(self.category.as_deref(), Category::Unknown, "category");

        let incident = Incident::new(self.title.trim(), self.description, severity, category)
            .with_source(self.source.unwrap_or_else(|| default_source.to_string()))
            .with_services(self.affected_services)
            .with_tags(self.tags);

        let team_members = self
            .team_members
            .into_iter()
            .enumerate()
            .map(|(i, m)| TeamMember {
                id: m.id.unwrap_or_else(|| format!("tm-{}", i)),
                name: m.name.unwrap_or_else(|| "Unknown".to_string()),
                email: m.email,
                skills: m.skills,
                on_call: m.on_call,
            })
            .collect();

        let inputs = WorkflowInputs {
            repositories: self.repositories,
            team_members,
        };
        (incident, inputs)
    }
}

fn parse_or<T>(value: Option<&str>, default: T, field: &str) -> T
where
    T: std::str::FromStr,
{
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {} value: {}", field, raw);
            default
        }),
        None => default,
    }
}

/// `POST /incident`
pub async fn create_incident(
    State(state): State<AppState>,
    Json(request): Json<IncidentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let (incident, inputs) = request.into_parts("manual");

    let workflow = state.runtime.execute_workflow(incident.clone(), inputs).await?;
    info!(incident_id = %incident.id, workflow_id = %workflow.id, "Incident accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "incident": incident,
            "workflow": WorkflowSummary::from(&workflow),
        })),
    ))
}

/// `POST /orchestrate/incident-workflow`
pub async fn orchestrate_incident_workflow(
    State(state): State<AppState>,
    Json(request): Json<IncidentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let (incident, inputs) = request.into_parts("orchestrate");

    let workflow = state.runtime.execute_workflow(incident.clone(), inputs).await?;
    info!(incident_id = %incident.id, workflow_id = %workflow.id, "Workflow triggered");

    let steps: Vec<String> = STEP_CATALOGUE
        .iter()
        .map(|def| format!("{}. {}", def.number, def.name))
        .collect();

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "workflow_triggered",
            "incident_id": incident.id,
            "incident_title": incident.title,
            "severity": incident.severity,
            "workflow": WorkflowSummary::from(&workflow),
            "workflow_steps": steps,
        })),
    ))
}

/// `GET /incident/:id`
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Incident>, ApiError> {
    let incident = state.runtime.get_incident(&IncidentId(id)).await?;
    Ok(Json(incident))
}

/// `GET /incidents`
pub async fn list_incidents(State(state): State<AppState>) -> Result<Json<Vec<Incident>>, ApiError> {
    Ok(Json(state.runtime.list_incidents().await?))
}
