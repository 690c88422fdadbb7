//! Domain event system: decoupled observation of the control core.
//!
//! Events are published when something interesting happens in the system.
//! Other components can subscribe to react without tight coupling. This is
//! separate from the per-turn event stream a caller consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A turn started processing for a session
    TurnStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The classifier produced an intent
    IntentClassified {
        session_id: String,
        task_type: String,
        confidence: f32,
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Context was assembled for a model call
    ContextAssembled {
        session_id: String,
        tokens: usize,
        limit: usize,
        dropped: usize,
        overflow: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A transcript was compacted
    SessionCompacted {
        session_id: String,
        original_turns: usize,
        compacted_turns: usize,
        compression_ratio: f64,
        timestamp: DateTime<Utc>,
    },

    /// A turn reached a terminal state
    TurnFinished {
        session_id: String,
        state: String,
        iterations: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::TurnStarted { .. } => "turn_started",
            DomainEvent::IntentClassified { .. } => "intent_classified",
            DomainEvent::ContextAssembled { .. } => "context_assembled",
            DomainEvent::ToolExecuted { .. } => "tool_executed",
            DomainEvent::SessionCompacted { .. } => "session_compacted",
            DomainEvent::TurnFinished { .. } => "turn_finished",
            DomainEvent::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
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

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
