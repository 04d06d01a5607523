//! Guidance-Indexer: offline full-text search over a guidance collection
//!
//! This crate crawls a single fixed listing page, fetches every guidance
//! document it links to, extracts the document text inside an isolated
//! parsing context, and persists a searchable index that can be queried
//! later without touching the network.

pub mod channel;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod index;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Guidance-Indexer operations
#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parsing channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crawl failed: {0}")]
    Crawl(#[from] CrawlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Failures crossing the isolation boundary to the parsing context
///
/// Cloneable so that every caller waiting on one in-flight context creation
/// can observe the same failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Parsing context could not be created: {0}")]
    Unavailable(String),

    #[error("Connection to parsing context lost: {0}")]
    ConnectionLost(String),

    #[error("Parsing failed: {0}")]
    Remote(String),

    #[error("Malformed response from parsing context: {0}")]
    Malformed(String),

    #[error("Failed to close parsing context: {0}")]
    Teardown(String),
}

impl ChannelError {
    /// Returns true if the parsing context must be presumed dead
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Extraction errors, reported inside the isolated context
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Extractor panicked: {0}")]
    Panicked(String),
}

/// Search index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Cannot build an index from an empty document set")]
    EmptyCorpus,

    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt serialized index: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Reasons a crawl aborts before an index is written
///
/// The `Display` text of each variant becomes the user-visible status, so
/// every abort cause reads differently.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Failed to fetch contents page: {0}")]
    ListingFetch(String),

    #[error("Could not extract valid guidance links from the contents page")]
    NoLinks,

    #[error("Could not parse the contents page: {0}")]
    ListingParse(ChannelError),

    #[error("No valid absolute guidance links could be constructed from {0} relative paths")]
    NoAbsoluteLinks(usize),

    #[error("Lost connection to the parsing context during page processing. Aborting.")]
    ContextLost(ChannelError),

    #[error("No documents could be successfully processed for indexing")]
    NoDocuments,

    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),

    #[error("Failed to persist index: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid crawl state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },
}

/// Result type alias for Guidance-Indexer operations
pub type Result<T> = std::result::Result<T, GuidanceError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, IndexService, StartOutcome};
pub use index::{Document, QueryEngine, SearchHit, SearchOutcome};
pub use state::{CrawlPhase, StatusSnapshot, StatusUpdate};
