use crate::{
    domain::events::{EventPublisher, EventTopic, WorkflowEvent},
    domain::incident::{Incident, IncidentId, IncidentStatus},
    domain::output::StepOutput,
    domain::repository::IncidentRepository,
    domain::step::StepResult,
    domain::workflow::WorkflowId,
    CoreError, CoreResult,
};
use super::write_locks::WriteLocks;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Copy the fields a successful step result owns onto the incident
///
/// Each step number writes a disjoint set of fields; step 7 writes none.
/// Returns the names of the fields whose value changed, so applying the same
/// result twice reports nothing the second time.
pub fn propagate(incident: &mut Incident, step_number: u8, output: &StepOutput) -> Vec<&'static str> {
    let mut changed = Vec::new();

    if output.step_number() != step_number {
        warn!(
            incident_id = %incident.id,
            step = step_number,
            produced_by = output.step_number(),
            "Result does not belong to this step, skipping propagation"
        );
        return changed;
    }

    fn set<T: PartialEq + Clone>(
        slot: &mut Option<T>,
        value: &T,
        name: &'static str,
        changed: &mut Vec<&'static str>,
    ) {
        if slot.as_ref() != Some(value) {
            *slot = Some(value.clone());
            changed.push(name);
        }
    }

    match output {
        StepOutput::Ticket(ticket) => {
            set(&mut incident.ticket_id, &ticket.ticket_id, "ticket_id", &mut changed);
            set(&mut incident.ticket_url, &ticket.ticket_url, "ticket_url", &mut changed);
        }
        StepOutput::ChatAlert(alert) => {
            set(&mut incident.chat_channel_id, &alert.channel_id, "chat_channel_id", &mut changed);
            set(
                &mut incident.chat_channel_name,
                &alert.channel_name,
                "chat_channel_name",
                &mut changed,
            );
        }
        StepOutput::Diagnostics(report) => {
            if let Some(issue) = &report.issue {
                set(
                    &mut incident.code_issue_number,
                    &issue.issue_number,
                    "code_issue_number",
                    &mut changed,
                );
                set(&mut incident.code_issue_url, &issue.issue_url, "code_issue_url", &mut changed);
            }
        }
        StepOutput::RootCause(analysis) => {
            set(&mut incident.root_cause, &analysis.root_cause, "root_cause", &mut changed);
            set(&mut incident.ai_analysis, analysis, "ai_analysis", &mut changed);
        }
        StepOutput::WikiPage(page) => {
            set(&mut incident.wiki_page_id, &page.page_id, "wiki_page_id", &mut changed);
            set(&mut incident.wiki_page_url, &page.page_url, "wiki_page_url", &mut changed);
        }
        StepOutput::Assignment(assignment) => {
            set(
                &mut incident.tracker_issue_key,
                &assignment.issue_key,
                "tracker_issue_key",
                &mut changed,
            );
            set(
                &mut incident.tracker_issue_url,
                &assignment.issue_url,
                "tracker_issue_url",
                &mut changed,
            );
            if let Some(assignee) = &assignment.assignee {
                set(&mut incident.assignee, assignee, "assignee", &mut changed);
            }
            if let Some(responder) = &assignment.assignee_id {
                if !incident.assigned_responders.contains(responder) {
                    incident.assigned_responders.push(responder.clone());
                    changed.push("assigned_responders");
                }
            }
            if incident.status == IncidentStatus::Open {
                incident.status = IncidentStatus::InProgress;
                changed.push("status");
            }
            if incident.acknowledged_at.is_none() {
                incident.acknowledged_at = Some(Utc::now());
                changed.push("acknowledged_at");
            }
        }
        StepOutput::Monitoring(_) => {}
    }

    changed
}

/// Applies step results to the stored incident and announces the change
///
/// Runs for the same incident share the incident record, so every
/// load-modify-store cycle holds that incident's write lock.
pub struct ResultPropagator {
    incident_repo: Arc<dyn IncidentRepository>,
    publisher: Arc<dyn EventPublisher>,
    write_locks: WriteLocks<IncidentId>,
}

impl ResultPropagator {
    /// Create a new propagator
    pub fn new(
        incident_repo: Arc<dyn IncidentRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            incident_repo,
            publisher,
            write_locks: WriteLocks::new(),
        }
    }

    /// Apply `result` of `step_number` to the incident
    ///
    /// No-op for failures and for results that change nothing. Otherwise the
    /// incident is stamped, stored, and `incident:updated` is published.
    pub async fn apply(
        &self,
        workflow_id: &WorkflowId,
        incident_id: &IncidentId,
        step_number: u8,
        result: &StepResult,
    ) -> CoreResult<Option<Incident>> {
        let Some(output) = result.output() else {
            return Ok(None);
        };

        let _guard = self.write_locks.acquire(incident_id).await;

        let mut incident = self
            .incident_repo
            .get(incident_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Incident {}", incident_id)))?;

        let changed = propagate(&mut incident, step_number, output);
        if changed.is_empty() {
            debug!(incident_id = %incident_id, step = step_number, "Nothing to propagate");
            return Ok(None);
        }

        incident.touch();
        self.incident_repo.put(&incident).await?;

        debug!(
            incident_id = %incident_id,
            step = step_number,
            fields = ?changed,
            "Incident updated from step result"
        );
        self.publisher.publish(
            WorkflowEvent::for_workflow(
                EventTopic::IncidentUpdated,
                workflow_id,
                incident_id,
                json!({
                    "fields": changed,
                    "status": incident.status,
                }),
            )
            .with_step(step_number),
        );

        Ok(Some(incident))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::testing::RecordingPublisher;
    use crate::domain::incident::{Category, Severity};
    use crate::domain::output::*;
    use crate::domain::repository::memory::MemoryIncidentRepository;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn incident() -> Incident {
        Incident::new(
            "Primary database unreachable",
            "All writes failing with connection refused",
            Severity::Critical,
            Category::Database,
        )
    }

    fn all_outputs() -> Vec<StepOutput> {
        vec![
            StepOutput::Ticket(Ticket {
                ticket_id: "INC0010001".into(),
                ticket_url: "https://snow/INC0010001".into(),
                priority: "P1".into(),
            }),
            StepOutput::ChatAlert(ChatAlert {
                channel_id: "C123".into(),
                channel_name: "inc-db".into(),
                alert_channel: "#incident-response".into(),
            }),
            StepOutput::Diagnostics(DiagnosticsReport {
                diagnostics: Diagnostics::default(),
                issue: Some(CodeIssue {
                    issue_number: 7,
                    issue_url: "https://github.com/acme/app/issues/7".into(),
                }),
            }),
            StepOutput::RootCause(RootCauseAnalysis {
                root_cause: "Connection pool exhausted".into(),
                contributing_factors: vec![],
                confidence: Confidence::High,
                immediate_actions: vec![],
                recommendations: vec![],
                estimated_time_to_resolve: "30 minutes".into(),
            }),
            StepOutput::WikiPage(WikiPage {
                page_id: "555".into(),
                page_url: "https://wiki/555".into(),
                title: "Incident".into(),
            }),
            StepOutput::Assignment(Assignment {
                issue_key: "INC-9".into(),
                issue_url: "https://jira/INC-9".into(),
                assignee: Some("Ada".into()),
                assignee_id: Some("u-ada".into()),
            }),
            StepOutput::Monitoring(MonitoringSetup {
                monitoring_enabled: true,
                dashboard_url: "https://mon/INC".into(),
                tracking: BTreeMap::new(),
            }),
        ]
    }

    #[test]
    fn test_each_step_writes_disjoint_fields() {
        let mut seen: Vec<&'static str> = Vec::new();
        let mut target = incident();
        for output in all_outputs() {
            let fields = propagate(&mut target, output.step_number(), &output);
            for field in &fields {
                assert!(!seen.contains(field), "{} written by two steps", field);
            }
            seen.extend(fields);
        }
        assert_eq!(target.ticket_id.as_deref(), Some("INC0010001"));
        assert_eq!(target.chat_channel_id.as_deref(), Some("C123"));
        assert_eq!(target.code_issue_number, Some(7));
        assert_eq!(target.root_cause.as_deref(), Some("Connection pool exhausted"));
        assert_eq!(target.wiki_page_id.as_deref(), Some("555"));
        assert_eq!(target.tracker_issue_key.as_deref(), Some("INC-9"));
        assert_eq!(target.assignee.as_deref(), Some("Ada"));
        assert_eq!(target.status, IncidentStatus::InProgress);
    }

    #[test]
    fn test_applying_twice_equals_applying_once() {
        for output in all_outputs() {
            let mut once = incident();
            propagate(&mut once, output.step_number(), &output);
            let mut twice = once.clone();
            let second = propagate(&mut twice, output.step_number(), &output);

            assert!(second.is_empty());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_mismatched_step_is_ignored() {
        let mut target = incident();
        let before = target.clone();
        let ticket = all_outputs().remove(0);
        assert!(propagate(&mut target, 2, &ticket).is_empty());
        assert_eq!(target, before);
    }

    #[tokio::test]
    async fn test_apply_stores_and_publishes() {
        let repo = Arc::new(MemoryIncidentRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let propagator = ResultPropagator::new(repo.clone(), publisher.clone());
        let target = incident();
        repo.put(&target).await.unwrap();

        let wf = WorkflowId("wf-1".into());
        let result = StepResult::Success {
            output: all_outputs().remove(0),
            note: None,
        };

        let updated = propagator.apply(&wf, &target.id, 1, &result).await.unwrap();
        assert!(updated.is_some());
        let stored = repo.get(&target.id).await.unwrap().unwrap();
        assert_eq!(stored.ticket_id.as_deref(), Some("INC0010001"));
        assert!(stored.updated_at >= target.updated_at);

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, EventTopic::IncidentUpdated);
        assert_eq!(events[0].step_number, Some(1));

        // second application changes nothing and stays quiet
        assert!(propagator.apply(&wf, &target.id, 1, &result).await.unwrap().is_none());
        assert_eq!(publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_noop() {
        let repo = Arc::new(MemoryIncidentRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let propagator = ResultPropagator::new(repo.clone(), publisher.clone());
        let target = incident();
        repo.put(&target).await.unwrap();

        let result = StepResult::Failure {
            error: "slack: channel_limit".into(),
        };
        let outcome = propagator
            .apply(&WorkflowId("wf".into()), &target.id, 2, &result)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(publisher.events().is_empty());
        assert_eq!(repo.get(&target.id).await.unwrap().unwrap(), target);
    }

    // Reads take long enough for a second writer to load the same record
    struct SlowReads(Arc<MemoryIncidentRepository>);

    #[async_trait::async_trait]
    impl IncidentRepository for SlowReads {
        async fn get(&self, id: &IncidentId) -> CoreResult<Option<Incident>> {
            let found = self.0.get(id).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            found
        }

        async fn put(&self, incident: &Incident) -> CoreResult<()> {
            self.0.put(incident).await
        }

        async fn list(&self) -> CoreResult<Vec<Incident>> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_each_others_fields() {
        let store = Arc::new(MemoryIncidentRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let propagator =
            ResultPropagator::new(Arc::new(SlowReads(store.clone())), publisher.clone());
        let target = incident();
        store.put(&target).await.unwrap();

        let mut outputs = all_outputs().into_iter();
        let ticket = StepResult::Success {
            output: outputs.next().unwrap(),
            note: None,
        };
        let alert = StepResult::Success {
            output: outputs.next().unwrap(),
            note: None,
        };

        let wf_a = WorkflowId("wf-a".into());
        let wf_b = WorkflowId("wf-b".into());
        let (first, second) = tokio::join!(
            propagator.apply(&wf_a, &target.id, 1, &ticket),
            propagator.apply(&wf_b, &target.id, 2, &alert),
        );
        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_some());

        let stored = store.get(&target.id).await.unwrap().unwrap();
        assert_eq!(stored.ticket_id.as_deref(), Some("INC0010001"));
        assert_eq!(stored.chat_channel_id.as_deref(), Some("C123"));
        assert_eq!(publisher.events().len(), 2);
        assert!(propagator.write_locks.is_empty());
    }
}
