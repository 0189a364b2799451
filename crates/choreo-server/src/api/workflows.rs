//! Workflow endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use choreo_core::{IncidentId, Workflow, WorkflowFilter, WorkflowId, WorkflowStatus, WorkflowSummary};
use serde::Deserialize;
use tracing::info;

use super::errors::ApiError;
use super::AppState;

/// Query string of `GET /workflows`
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowQuery {
    pub status: Option<String>,
    pub incident_id: Option<String>,
}

impl WorkflowQuery {
    /// Turn the query into a repository filter
    pub fn into_filter(self) -> Result<WorkflowFilter, ApiError> {
        let mut filter = WorkflowFilter::default();
        if let Some(status) = self.status.filter(|s| !s.is_empty()) {
            filter = filter.with_status(status.parse::<WorkflowStatus>()?);
        }
        if let Some(incident_id) = self.incident_id.filter(|s| !s.is_empty()) {
            filter = filter.for_incident(IncidentId(incident_id));
        }
        Ok(filter)
    }
}

/// `GET /workflows`
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<WorkflowQuery>,
) -> Result<Json<Vec<WorkflowSummary>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.runtime.list_workflows(&filter).await?))
}

/// `GET /workflow/:id`
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.runtime.get_workflow_by_id(&WorkflowId(id)).await?))
}

/// `POST /workflow/:id/cancel`
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSummary>, ApiError> {
    let workflow = state.runtime.cancel_workflow(&WorkflowId(id)).await?;
    info!(workflow_id = %workflow.id, "Workflow cancelled via API");
    Ok(Json(WorkflowSummary::from(&workflow)))
}

/// `POST /workflow/:id/retry`
pub async fn retry_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSummary>, ApiError> {
    let workflow = state.runtime.retry_workflow(&WorkflowId(id)).await?;
    info!(workflow_id = %workflow.id, "Workflow retry started via API");
    Ok(Json(WorkflowSummary::from(&workflow)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_into_filter() {
        let filter = WorkflowQuery {
            status: Some("completed_with_errors".to_string()),
            incident_id: Some("INC-1".to_string()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(WorkflowStatus::CompletedWithErrors));
        assert_eq!(filter.incident_id, Some(IncidentId("INC-1".to_string())));

        let empty = WorkflowQuery {
            status: Some(String::new()),
            incident_id: None,
        }
        .into_filter()
        .unwrap();
        assert!(empty.status.is_none());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = WorkflowQuery {
            status: Some("sleeping".to_string()),
            incident_id: None,
        }
        .into_filter();
        assert!(result.is_err());
    }
}
