//! Stop gate released by `stop(true)`.

use std::sync::Arc;
use tokio::sync::Notify;

/// Single-permit gate: `send` never blocks and stores at most one permit,
/// `wait` consumes it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases one waiter, or the next one to arrive.
    pub fn send(&self) {
        self.notify.notify_one();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
