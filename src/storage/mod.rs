//! Storage module for persisting the search index
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The serialized index and its document metadata
//! - Build timestamp and the hash of the config that produced it
//!
//! Every successful rebuild replaces all four records in one transaction, so a
//! reader never observes an index paired with another build's metadata.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, StorageResult};

use crate::StorageError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Key holding the serialized search index
pub const INDEX_KEY: &str = "guidance_index";

/// Key holding the id -> metadata map as JSON
pub const DOCUMENTS_KEY: &str = "guidance_documents";

/// Key holding the RFC 3339 build timestamp
pub const CREATED_AT_KEY: &str = "index_created_at";

/// Key holding the hash of the config used for the build
pub const CONFIG_HASH_KEY: &str = "index_config_hash";

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// Everything one successful build leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedIndex {
    /// Serialized index, opaque to storage
    pub index: String,
    /// Document metadata map as JSON, opaque to storage
    pub documents: String,
    pub created_at: DateTime<Utc>,
    pub config_hash: Option<String>,
}

/// Writes a complete build, replacing any previous one atomically
pub fn save_index(store: &mut dyn KeyValueStore, record: &PersistedIndex) -> StorageResult<()> {
    let mut entries = vec![
        (INDEX_KEY, record.index.clone()),
        (DOCUMENTS_KEY, record.documents.clone()),
        (CREATED_AT_KEY, record.created_at.to_rfc3339()),
    ];
    let mut removed = Vec::new();
    match &record.config_hash {
        Some(hash) => entries.push((CONFIG_HASH_KEY, hash.clone())),
        None => removed.push(CONFIG_HASH_KEY),
    }
    store.write_batch(&entries, &removed)
}

/// Returns true if a build has been persisted
///
/// Only checks for presence; nothing is decoded.
pub fn has_index(store: &dyn KeyValueStore) -> StorageResult<bool> {
    Ok(store.contains(INDEX_KEY)? && store.contains(DOCUMENTS_KEY)?)
}

/// Reads the last build
///
/// Returns `Ok(None)` unless both the index and its metadata are present.
pub fn load_index(store: &dyn KeyValueStore) -> StorageResult<Option<PersistedIndex>> {
    let (Some(index), Some(documents)) = (store.get(INDEX_KEY)?, store.get(DOCUMENTS_KEY)?) else {
        return Ok(None);
    };

    let created_at = match store.get(CREATED_AT_KEY)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| StorageError::InvalidValue {
                key: CREATED_AT_KEY.to_string(),
                message: e.to_string(),
            })?
            .with_timezone(&Utc),
        None => {
            return Err(StorageError::InvalidValue {
                key: CREATED_AT_KEY.to_string(),
                message: "missing build timestamp".to_string(),
            })
        }
    };

    Ok(Some(PersistedIndex {
        index,
        documents,
        created_at,
        config_hash: store.get(CONFIG_HASH_KEY)?,
    }))
}
