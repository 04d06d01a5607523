//! Status notifications and snapshots for the presentation layer

use serde::Serialize;
use tokio::sync::broadcast;

/// A progress notification pushed to any listening presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub text: String,
    /// True once the crawl has finished, successfully or not
    pub done: bool,
}

impl StatusUpdate {
    pub fn new(text: impl Into<String>, done: bool) -> Self {
        Self {
            text: text.into(),
            done,
        }
    }
}

/// Answer to a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status_text: String,
    pub is_indexing: bool,
}

/// Receives fire-and-forget status notifications
///
/// Implementations must not block; delivery failures are theirs to swallow.
pub trait StatusObserver: Send + Sync {
    fn notify(&self, update: &StatusUpdate);
}

impl StatusObserver for broadcast::Sender<StatusUpdate> {
    fn notify(&self, update: &StatusUpdate) {
        // Having no subscriber is the normal case
        let _ = self.send(update.clone());
    }
}
