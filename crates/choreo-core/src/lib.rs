//!
//! Choreo Core - workflow choreography engine for incident response
//!
//! An incident is driven through a fixed sequence of seven steps, each
//! delegated to an external collaborator. This crate holds the domain
//! model, the store and publisher ports, and the services that execute a
//! run and keep the incident in sync with step results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - incidents, workflows, steps and events
pub mod domain;

/// Application services - lifecycle, execution and propagation
pub mod application;

/// Collaborator ports
pub mod collaborators;

/// Error types
pub mod error;

// Re-export key types
pub use error::{CoreError, CoreResult};

pub use application::runtime_interface::{EngineSettings, RuntimeInterface, WorkflowSummary};
pub use collaborators::{
    AiAnalyzer, Chat, CodeHost, Collaborators, IssueTracker, Monitoring, Ticketing, Wiki,
};
pub use domain::events::{EventPublisher, EventScope, EventTopic, WorkflowEvent};
pub use domain::incident::{Category, Incident, IncidentId, IncidentStatus, Severity, TeamMember};
pub use domain::output::{Outcome, StepOutput};
pub use domain::repository::{IncidentRepository, WorkflowFilter, WorkflowRepository};
pub use domain::step::{StepResult, StepStatus, ToolId, STEP_CATALOGUE};
pub use domain::workflow::{Workflow, WorkflowId, WorkflowInputs, WorkflowStatus};
