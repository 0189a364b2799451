use crate::domain::output::RootCauseAnalysis;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Value object: Incident ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub String);

impl IncidentId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(format!("INC-{}", &Uuid::new_v4().simple().to_string()[..12].to_uppercase()))
    }

    /// Short form used in channel names and log lines
    pub fn short(&self) -> &str {
        let start = self.0.len().saturating_sub(8);
        self.0.get(start..).unwrap_or(&self.0)
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incident severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Service down or data at risk
    Critical,
    /// Major degradation
    High,
    /// Partial degradation
    Medium,
    /// Minor issue
    Low,
}

impl Severity {
    /// Ticket priority for this severity
    pub fn priority(&self) -> &'static str {
        match self {
            Severity::Critical => "P1",
            Severity::High => "P2",
            Severity::Medium => "P3",
            Severity::Low => "P4",
        }
    }

    /// Lower-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Critical and high incidents get the narrower diagnostics window
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "sev1" | "p1" => Ok(Severity::Critical),
            "high" | "sev2" | "p2" => Ok(Severity::High),
            "medium" | "sev3" | "p3" => Ok(Severity::Medium),
            "low" | "sev4" | "p4" => Ok(Severity::Low),
            other => Err(CoreError::ValidationError(format!("Unknown severity: {}", other))),
        }
    }
}

/// Incident category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Hosts, containers, clusters
    Infrastructure,
    /// Application code and runtime
    Application,
    /// Databases and storage
    Database,
    /// DNS, load balancers, connectivity
    Network,
    /// Authentication and intrusion
    Security,
    /// Latency and resource exhaustion
    Performance,
    /// Not yet classified
    Unknown,
}

impl Category {
    /// Lower-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infrastructure => "infrastructure",
            Category::Application => "application",
            Category::Database => "database",
            Category::Network => "network",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Unknown => "unknown",
        }
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "infrastructure" => Ok(Category::Infrastructure),
            "application" => Ok(Category::Application),
            "database" => Ok(Category::Database),
            "network" => Ok(Category::Network),
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "unknown" => Ok(Category::Unknown),
            other => Err(CoreError::ValidationError(format!("Unknown category: {}", other))),
        }
    }
}

/// Incident status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, nobody working on it yet
    Open,
    /// Assigned and being worked
    InProgress,
    /// Mitigated
    Resolved,
    /// Closed out
    Closed,
}

/// A responder that can be assigned to an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Responder ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact email, used for issue-tracker assignment
    #[serde(default)]
    pub email: Option<String>,
    /// Skill tags such as `dba` or `kubernetes`
    #[serde(default)]
    pub skills: Vec<String>,
    /// Currently on call
    #[serde(default)]
    pub on_call: bool,
}

/// Entity: the subject of remediation
///
/// The integration reference fields are written only by the result propagator,
/// each by exactly one step number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier
    pub id: IncidentId,
    /// Short title
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Severity
    pub severity: Severity,
    /// Category
    pub category: Category,
    /// Current status
    pub status: IncidentStatus,
    /// Originating system (`manual`, `datadog`, `pagerduty`, ...)
    pub source_system: String,
    /// Affected services
    #[serde(default)]
    pub affected_services: Vec<String>,
    /// Affected components within those services
    #[serde(default)]
    pub affected_components: Vec<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ticketing system ticket number (step 1)
    pub ticket_id: Option<String>,
    /// Ticket link (step 1)
    pub ticket_url: Option<String>,
    /// Chat channel ID (step 2)
    pub chat_channel_id: Option<String>,
    /// Chat channel name (step 2)
    pub chat_channel_name: Option<String>,
    /// Code-host issue number (step 3)
    pub code_issue_number: Option<u64>,
    /// Code-host issue link (step 3)
    pub code_issue_url: Option<String>,
    /// Root cause hypothesis (step 4)
    pub root_cause: Option<String>,
    /// Full AI analysis (step 4)
    pub ai_analysis: Option<RootCauseAnalysis>,
    /// Documentation page ID (step 5)
    pub wiki_page_id: Option<String>,
    /// Documentation page link (step 5)
    pub wiki_page_url: Option<String>,
    /// Issue tracker key (step 6)
    pub tracker_issue_key: Option<String>,
    /// Issue tracker link (step 6)
    pub tracker_issue_url: Option<String>,
    /// Assignee display name (step 6)
    pub assignee: Option<String>,
    /// Responder IDs assigned so far (step 6)
    #[serde(default)]
    pub assigned_responders: Vec<String>,

    /// When the problem was detected
    pub detected_at: DateTime<Utc>,
    /// When a responder was assigned
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the incident was resolved
    pub resolved_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Create an open incident with no integration references
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        category: Category,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: IncidentId::generate(),
            title: title.into(),
            description: description.into(),
            severity,
            category,
            status: IncidentStatus::Open,
            source_system: "manual".to_string(),
            affected_services: Vec::new(),
            affected_components: Vec::new(),
            tags: Vec::new(),
            ticket_id: None,
            ticket_url: None,
            chat_channel_id: None,
            chat_channel_name: None,
            code_issue_number: None,
            code_issue_url: None,
            root_cause: None,
            ai_analysis: None,
            wiki_page_id: None,
            wiki_page_url: None,
            tracker_issue_key: None,
            tracker_issue_url: None,
            assignee: None,
            assigned_responders: Vec::new(),
            detected_at: now,
            acknowledged_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the affected services
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Set the originating system
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_system = source.into();
        self
    }

    /// Set the tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Update the timestamp
    #[inline]
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Lower-case slug of the title, used for channel names
    pub fn slug(&self, max_len: usize) -> String {
        let mut slug = String::with_capacity(max_len);
        let mut last_dash = true;
        for c in self.title.chars() {
            if slug.len() >= max_len {
                break;
            }
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        slug.trim_end_matches('-').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_incident_is_open_and_unlinked() {
        let incident = Incident::new(
            "Database connection pool exhausted",
            "Primary cluster refusing connections",
            Severity::Critical,
            Category::Database,
        );

        assert_eq!(incident.status, IncidentStatus::Open);
        assert!(incident.id.0.starts_with("INC-"));
        assert!(incident.ticket_id.is_none());
        assert!(incident.chat_channel_id.is_none());
        assert!(incident.ai_analysis.is_none());
        assert_eq!(incident.source_system, "manual");
    }

    #[test]
    fn test_severity_priority_and_parse() {
        assert_eq!(Severity::Critical.priority(), "P1");
        assert_eq!(Severity::High.priority(), "P2");
        assert_eq!(Severity::Medium.priority(), "P3");
        assert_eq!(Severity::Low.priority(), "P4");

        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("sev2".parse::<Severity>().unwrap(), Severity::High);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_category_serde_is_snake_case() {
        let json = serde_json::to_string(&Category::Infrastructure).unwrap();
        assert_eq!(json, "\"infrastructure\"");
        assert_eq!("network".parse::<Category>().unwrap(), Category::Network);
    }

    #[test]
    fn test_slug() {
        let incident = Incident::new(
            "API Latency -- Spike (EU)",
            "p99 above 2s",
            Severity::High,
            Category::Performance,
        );
        assert_eq!(incident.slug(40), "api-latency-spike-eu");
        assert_eq!(incident.slug(3), "api");
    }
}
