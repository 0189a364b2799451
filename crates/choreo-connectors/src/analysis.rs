//! Rule-based recommendations and assignee selection

use choreo_core::domain::output::Diagnostics;
use choreo_core::{Category, Incident, TeamMember};

/// Recommendations derived from the diagnostics and the incident category
///
/// One entry per repository with deployments, one per repository with
/// failed CI runs, then the category hint if there is one.
pub fn recommendations(incident: &Incident, diagnostics: Option<&Diagnostics>) -> Vec<String> {
    let mut recs = Vec::new();

    if let Some(diagnostics) = diagnostics {
        for repo in distinct(diagnostics.deployments.iter().map(|d| d.repository.as_str())) {
            recs.push(format!(
                "Recent deployment detected in {} - consider rollback if needed",
                repo
            ));
        }
        for repo in distinct(diagnostics.failed_runs.iter().map(|r| r.repository.as_str())) {
            recs.push(format!("Failed CI/CD runs in {} - investigate build failures", repo));
        }
    }

    if let Some(hint) = category_recommendation(incident.category) {
        recs.push(hint.to_string());
    }
    recs
}

fn category_recommendation(category: Category) -> Option<&'static str> {
    match category {
        Category::Database => Some("Check database connection pools and recent schema changes"),
        Category::Infrastructure => Some("Verify container/pod health and resource limits"),
        Category::Network => Some("Check DNS resolution and load balancer health"),
        Category::Security => Some("Review authentication logs and access patterns"),
        Category::Application => Some("Check application logs for exceptions and errors"),
        Category::Performance | Category::Unknown => None,
    }
}

fn distinct<'a>(repos: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen: Vec<&str> = Vec::new();
    for repo in repos {
        if !seen.contains(&repo) {
            seen.push(repo);
        }
    }
    seen
}

/// Skills that qualify a responder for a category
pub fn category_skills(category: Category) -> &'static [&'static str] {
    match category {
        Category::Database => &["dba", "postgresql", "mysql", "sql"],
        Category::Infrastructure => &["sre", "devops", "kubernetes"],
        Category::Security => &["security", "soc"],
        Category::Network => &["networking", "dns"],
        Category::Application => &["backend", "developer"],
        Category::Performance | Category::Unknown => &[],
    }
}

/// First on-call member, else first member with a matching skill, else the first member
pub fn select_assignee<'a>(incident: &Incident, team: &'a [TeamMember]) -> Option<&'a TeamMember> {
    if let Some(on_call) = team.iter().find(|m| m.on_call) {
        return Some(on_call);
    }
    let skills = category_skills(incident.category);
    team.iter()
        .find(|m| m.skills.iter().any(|s| skills.contains(&s.as_str())))
        .or_else(|| team.first())
}
