use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event key type
pub type EventKey = String;

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Empty,
    String(String),
}

/// Workflow transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvent {
    /// Event key (e.g., "boot.completed", "resync.failed")
    pub key: EventKey,

    /// Event payload
    pub payload: EventPayload,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl NodeEvent {
    /// Create a new event
    pub fn new(key: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            key: key.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create an event with no payload
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, EventPayload::Empty)
    }

    /// Create an event with a string payload
    pub fn with_string(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, EventPayload::String(message.into()))
    }
}

/// Event emitter
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<NodeEvent>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event. Dropped silently when nobody listens.
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }
}

/// Event catalog - predefined event keys
pub mod events {
    // Boot
    pub const BOOT_STARTED: &str = "boot.started";
    pub const BOOT_ATTEMPT_FAILED: &str = "boot.attempt.failed";
    pub const BOOT_COMPLETED: &str = "boot.completed";

    // Settings
    pub const SETTINGS_SAVED: &str = "settings.saved";
    pub const SETTINGS_FAILED: &str = "settings.failed";

    // Scheduler
    pub const SCHEDULER_STARTED: &str = "scheduler.started";
    pub const SCHEDULER_STOPPED: &str = "scheduler.stopped";
    pub const ADDRESS_CHANGED: &str = "address.changed";
    pub const LND_RESTARTED: &str = "lnd.restarted";
    pub const IMAGES_PULLED: &str = "images.pulled";

    // Resync / reset
    pub const RESYNC_STARTED: &str = "resync.started";
    pub const RESYNC_COMPLETED: &str = "resync.completed";
    pub const RESYNC_FAILED: &str = "resync.failed";
    pub const RESET_STARTED: &str = "reset.started";
    pub const RESET_COMPLETED: &str = "reset.completed";
    pub const RESET_FAILED: &str = "reset.failed";

    // Credential rotation
    pub const PASSWORD_CHANGED: &str = "password.changed";
    pub const PASSWORD_FORBIDDEN: &str = "password.forbidden";
    pub const PASSWORD_FAILED: &str = "password.failed";

    // Wallet
    pub const WALLET_UNLOCKED: &str = "wallet.unlocked";
    pub const WALLET_UNLOCK_FAILED: &str = "wallet.unlock.failed";
}
