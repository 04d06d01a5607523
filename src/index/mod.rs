//! Full-text index over crawled guidance documents
//!
//! # Components
//!
//! - `schema`: Fields and the analyzer shared by building and querying
//! - `builder`: Builds, serializes and persists an index from a document set
//! - `query`: Loads a persisted index and answers raw query strings

mod builder;
mod query;
mod schema;

pub use builder::{build, persist, BuiltIndex, SerializedIndex, SERIALIZATION_FORMAT};
pub use query::{QueryEngine, SearchHit, SearchOutcome, MAX_RESULTS, MIN_QUERY_CHARS};
pub use schema::preflight;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One successfully parsed guidance page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Absolute URL of the page, unique within a corpus
    pub id: String,
    pub title: String,
    /// Plain text with whitespace collapsed
    pub body: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Label data kept beside the index so results can be shown without bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
}

/// Document id to metadata
pub type DocumentMetadataMap = BTreeMap<String, DocumentMetadata>;
