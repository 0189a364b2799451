/// Workflow-level state transitions
pub mod lifecycle;

/// Sequential step execution
pub mod step_executor;

/// Copies step results onto the incident
pub mod result_propagator;

/// Runtime interface for external systems
pub mod runtime_interface;

/// Per-record async write locks
pub mod write_locks;
