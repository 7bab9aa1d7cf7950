//! Event bus for costscope using tokio::broadcast
//!
//! Lets live consumers (dashboards, tailing CLIs) follow a session without
//! polling the record log.

use crate::models::CallRecord;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A call record was appended to the log
    RecordAppended(Arc<CallRecord>),
    /// The log was cleared
    Reset,
    /// Stored records were replayed into the log at init
    Replayed(usize),
}

/// Event bus for broadcasting session events
///
/// Uses tokio::broadcast for multi-consumer support. Publishing never blocks;
/// slow subscribers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Get current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
