//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: The orchestrator's state machine phases
//! - `CrawlState`: The single-crawl guard plus the current status text
//! - `StatusUpdate` / `StatusObserver`: Progress notifications for listeners

mod crawl_phase;
mod crawl_state;
mod status;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use crawl_state::CrawlState;
pub use status::{StatusObserver, StatusSnapshot, StatusUpdate};
