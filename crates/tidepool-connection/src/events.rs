//! Lifecycle events published by the manager

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Something the manager did that a caller may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A connection was acquired for a caller
    Connected { session_id: u64 },
    /// An acquisition attempt failed and will be retried
    Retry {
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    /// Acquisition failed after every attempt
    AcquireFailed { attempts: u32, error: String },
    /// A zombie session was killed
    Killed { session_id: u64 },
    /// Killing a zombie session failed
    KillFailed { session_id: u64, error: String },
    /// A flush finished
    Flushed { disconnected: usize, killed: usize },
    /// The manager was shut down
    Closed,
}

/// Broadcast sender that never fails the operation publishing to it
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<ManagerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ManagerEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}
