//! Crawler module for rebuilding the guidance index
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and link resolution
//! - Overall crawl coordination
//! - The control surface a presentation layer drives

mod coordinator;
mod fetcher;

pub use coordinator::{preflight, Coordinator, StartOutcome, STATUS_INDEX_LOADED, STATUS_NOT_BUILT};
pub use fetcher::{
    build_http_client, fetch_page, page_label, resolve_links, user_agent_string, FetchResult,
};

use crate::config::Config;
use crate::state::{StatusSnapshot, StatusUpdate};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the status broadcast; slow subscribers lose the oldest updates
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Control surface over a coordinator
///
/// `start` returns immediately and the crawl runs on the tokio runtime.
/// Progress is published to every subscriber as [`StatusUpdate`]s.
#[derive(Clone)]
pub struct IndexService {
    coordinator: Arc<Coordinator>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl IndexService {
    /// Wraps a coordinator whose observer is `updates`
    pub fn new(coordinator: Coordinator, updates: broadcast::Sender<StatusUpdate>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            updates,
        }
    }

    /// Builds the coordinator and its notification channel from configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use guidance_indexer::config::load_config_with_hash;
    /// use guidance_indexer::IndexService;
    /// use std::path::Path;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
    /// let service = IndexService::from_config(config, Some(hash))?;
    /// let mut updates = service.subscribe();
    /// service.start();
    /// while let Ok(update) = updates.recv().await {
    ///     println!("{}", update.text);
    ///     if update.done {
    ///         break;
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: Config, config_hash: Option<String>) -> crate::Result<Self> {
        let (updates, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let coordinator =
            Coordinator::from_config(config, config_hash, Arc::new(updates.clone()))?;
        Ok(Self::new(coordinator, updates))
    }

    /// Starts a crawl in the background
    ///
    /// Must be called from within a tokio runtime. A request while a crawl
    /// is running is a no-op reported as [`StartOutcome::AlreadyRunning`].
    pub fn start(&self) -> StartOutcome {
        let outcome = self.coordinator.begin();
        if outcome == StartOutcome::Started {
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                // The outcome is already in the status text
                let _ = coordinator.run().await;
            });
        }
        outcome
    }

    pub fn status(&self) -> StatusSnapshot {
        self.coordinator.status()
    }

    /// Receives every status update published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}
