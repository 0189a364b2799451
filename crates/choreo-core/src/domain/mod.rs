/// Incident model
pub mod incident;

/// Typed collaborator results
pub mod output;

/// Step catalogue and per-step state
pub mod step;

/// Lifecycle events and the publisher port
pub mod events;

/// Workflow aggregate
pub mod workflow;

/// Repository interfaces
pub mod repository;
