//! Event bus for boardkit using tokio::broadcast
//!
//! Lets UI collaborators observe save-status transitions and board
//! lifecycle events without polling the session.

use crate::session::SaveStatus;
use tokio::sync::broadcast;

/// Events emitted by the edit session
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A board became the active document (from cache or remote)
    BoardLoaded(String),
    /// A flush persisted the active board remotely
    BoardSaved(String),
    /// A flush failed; the board stays dirty until the next trigger
    SaveFailed(String),
    /// The save-status indicator changed
    StatusChanged(SaveStatus),
    /// A board was deleted remotely and evicted from the cache
    BoardDeleted(String),
}

/// Event bus for broadcasting session events
///
/// Uses tokio::broadcast for multi-consumer support: a status widget
/// subscribes for indicator updates, a board list for cache refreshes.
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (64 events)
    pub fn default_capacity() -> Self {
        Self::new(64)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BoardEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
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
