//! The orchestrator's crawl state
//!
//! Holds the single-crawl guard, the current phase and the status text.

use crate::state::{CrawlPhase, StatusSnapshot};
use crate::CrawlError;

/// Process-wide crawl state owned by the orchestrator
///
/// `is_indexing` is the mutual-exclusion guard: only one crawl can hold it,
/// and a second start request while it is held is refused.
#[derive(Debug, Clone)]
pub struct CrawlState {
    phase: CrawlPhase,
    is_indexing: bool,
    status_text: String,
}

impl CrawlState {
    /// Creates an idle state with the given status text
    pub fn new(status_text: impl Into<String>) -> Self {
        Self {
            phase: CrawlPhase::Idle,
            is_indexing: false,
            status_text: status_text.into(),
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn is_indexing(&self) -> bool {
        self.is_indexing
    }

    /// Claims the crawl slot
    ///
    /// Returns false, changing nothing, if a crawl is already running.
    pub fn try_begin(&mut self) -> bool {
        if self.is_indexing {
            return false;
        }
        self.is_indexing = true;
        self.phase = CrawlPhase::FetchingListing;
        true
    }

    /// Moves to the next phase, rejecting moves the state machine forbids
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), CrawlError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Marks the running crawl as failed
    pub fn fail(&mut self) {
        if self.phase.is_active() {
            self.phase = CrawlPhase::Failed;
        }
    }

    /// Releases the crawl slot and returns to `Idle`
    pub fn finish(&mut self) {
        self.is_indexing = false;
        self.phase = CrawlPhase::Idle;
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status_text: self.status_text.clone(),
            is_indexing: self.is_indexing,
        }
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new("Ready.")
    }
}
