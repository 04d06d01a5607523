/// Crawl phase definitions for the orchestrator's state machine
///
/// A crawl moves `Idle → FetchingListing → ExtractingLinks → FetchingPages →
/// BuildingIndex → Done`, may drop to `Failed` from any active phase, and
/// returns to `Idle` once finished.
use std::fmt;

/// Represents the current phase of the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// No crawl running; initial and post-completion phase
    Idle,

    // ===== Active Phases =====
    /// Downloading the listing page
    FetchingListing,

    /// Asking the parsing context for guidance links
    ExtractingLinks,

    /// Fetching and extracting each guidance document in turn
    FetchingPages,

    /// Building and persisting the search index
    BuildingIndex,

    // ===== Outcome Phases =====
    /// The index was rebuilt
    Done,

    /// The crawl aborted; the previous index is untouched
    Failed,
}

impl CrawlPhase {
    /// Returns true while a crawl is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::FetchingListing | Self::ExtractingLinks | Self::FetchingPages | Self::BuildingIndex
        )
    }

    /// Returns true for the two outcome phases
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Checks whether moving from this phase to `next` is allowed
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;

        match (self, next) {
            (Idle, FetchingListing) => true,
            (FetchingListing, ExtractingLinks) => true,
            (ExtractingLinks, FetchingPages) => true,
            (FetchingPages, BuildingIndex) => true,
            (BuildingIndex, Done) => true,
            (from, Failed) if from.is_active() => true,
            (from, Idle) if from.is_outcome() => true,
            _ => false,
        }
    }

    /// Short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingListing => "fetching_listing",
            Self::ExtractingLinks => "extracting_links",
            Self::FetchingPages => "fetching_pages",
            Self::BuildingIndex => "building_index",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns all phases
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::FetchingListing,
            Self::ExtractingLinks,
            Self::FetchingPages,
            Self::BuildingIndex,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
