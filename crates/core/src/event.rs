//! Turn events: optional observers of the agent loop.
//!
//! Strategies publish an event after every reasoning step, every tool
//! execution, and at the end of the turn. Observers subscribe without the
//! loop knowing who is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted while a turn executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TurnEvent {
    /// A reasoning step finished
    ReasonStep {
        conversation_id: String,
        llm_calls: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        conversation_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The turn produced its final answer
    TurnCompleted {
        conversation_id: String,
        strategy: String,
        llm_calls: u32,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for turn events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<TurnEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: TurnEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(TurnEvent::ToolExecuted {
            conversation_id: "conv-1".into(),
            tool_name: "search_document".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            TurnEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "search_document");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(TurnEvent::TurnCompleted {
            conversation_id: "conv-1".into(),
            strategy: "graph".into(),
            llm_calls: 1,
            degraded: false,
            timestamp: Utc::now(),
        });
    }
}
