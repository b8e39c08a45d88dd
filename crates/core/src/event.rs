//! Domain event system: observe the engine without coupling to it.
//!
//! The orchestrator publishes an event at each state transition of an
//! evaluate pass. Subscribers (the CLI's verbose mode, tests) filter for what
//! they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The classifier chose an action
    IntentClassified {
        action: String,
        confidence: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A capability (or the planner) ran
    CapabilityExecuted {
        action: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One subtask of a plan finished, successfully or not
    SubtaskCompleted {
        index: usize,
        action: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A re-evaluation round started
    ReEvaluationRound {
        round: usize,
        action: String,
        timestamp: DateTime<Utc>,
    },

    /// The final assistant message was produced
    ReplySynthesized {
        /// True when no action ran before the reply
        direct: bool,
        timestamp: DateTime<Utc>,
    },

    /// An oracle call failed and a fallback was used
    OracleFailed {
        stage: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
