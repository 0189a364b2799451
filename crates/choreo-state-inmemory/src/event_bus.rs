//! Broadcast event bus
//!
//! Fan-out of engine events to any number of in-process subscribers.
//! Publishing never blocks; with no subscribers the event is dropped.

use choreo_core::{EventPublisher, EventScope, WorkflowEvent};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

/// Default buffer size per subscriber
pub const DEFAULT_CAPACITY: usize = 1000;

/// Event bus for publishing and subscribing to workflow events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose subscribers buffer up to `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every event
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of one workflow or one incident
    pub fn subscribe_scoped(&self, scope: EventScope) -> ScopedSubscription {
        ScopedSubscription {
            rx: self.sender.subscribe(),
            scope,
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: WorkflowEvent) {
        trace!(topic = %event.topic, incident_id = %event.incident_id, "Broadcasting event");
        // Broadcast (ignore errors if no receivers)
        let _ = self.sender.send(event);
    }
}

/// Receiver that only yields events matching its scope
#[derive(Debug)]
pub struct ScopedSubscription {
    rx: broadcast::Receiver<WorkflowEvent>,
    scope: EventScope,
}

impl ScopedSubscription {
    /// Scope this subscription filters on
    pub fn scope(&self) -> &EventScope {
        &self.scope
    }

    /// Next matching event, `None` once the bus is gone
    ///
    /// A subscriber that falls behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.matches(&self.scope) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, scope = ?self.scope, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream of matching events
    pub fn into_stream(self) -> impl Stream<Item = WorkflowEvent> {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}
