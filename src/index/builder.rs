//! Index construction and serialization
//!
//! Indexes are written by tantivy into a scratch directory, then every file
//! is packed into a single JSON record so the whole index can live in one
//! storage value.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use tantivy::{doc, Index, IndexWriter};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::schema::{build_schema, register_tokenizer, IndexFields};
use super::{Document, DocumentMetadata, DocumentMetadataMap};
use crate::storage::{save_index, KeyValueStore, PersistedIndex};
use crate::{CrawlError, IndexError};

/// Version tag written into every serialized index
pub const SERIALIZATION_FORMAT: u32 = 1;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// On-storage form of an index: file name to hex-encoded contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIndex {
    pub format: u32,
    pub files: BTreeMap<String, String>,
}

/// Result of a build, ready to persist
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: SerializedIndex,
    pub metadata: DocumentMetadataMap,
}

impl BuiltIndex {
    pub fn document_count(&self) -> usize {
        self.metadata.len()
    }
}

/// Builds an index and its metadata map from a complete document set
///
/// # Arguments
///
/// * `documents` - The crawled corpus; must not be empty
///
/// # Returns
///
/// * `Ok(BuiltIndex)` - Serialized index plus an id -> title map covering
///   exactly the indexed ids
/// * `Err(IndexError::EmptyCorpus)` - Nothing to index
/// * `Err(IndexError)` - tantivy or I/O failure
pub fn build(documents: &[Document]) -> Result<BuiltIndex, IndexError> {
    if documents.is_empty() {
        return Err(IndexError::EmptyCorpus);
    }

    let scratch = TempDir::new()?;
    let index = Index::create_in_dir(scratch.path(), build_schema())?;
    register_tokenizer(&index);
    let fields = IndexFields::resolve(&index.schema())?;

    let mut metadata = DocumentMetadataMap::new();
    let mut seen = HashSet::new();

    // One thread keeps the result to a single segment
    let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
    for document in documents {
        if !seen.insert(document.id.as_str()) {
            warn!("Duplicate document id {}, keeping first occurrence", document.id);
            continue;
        }
        writer.add_document(doc!(
            fields.id => document.id.clone(),
            fields.title => document.title.clone(),
            fields.body => document.body.clone(),
        ))?;
        metadata.insert(
            document.id.clone(),
            DocumentMetadata {
                title: document.title.clone(),
            },
        );
    }
    writer.commit()?;
    writer.wait_merging_threads()?;

    let index = pack_directory(&scratch)?;
    info!(
        "Built index for {} documents ({} files)",
        metadata.len(),
        index.files.len()
    );

    Ok(BuiltIndex { index, metadata })
}

fn pack_directory(scratch: &TempDir) -> Result<SerializedIndex, IndexError> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(scratch.path())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_lock_file(&name) {
            continue;
        }
        let bytes = fs::read(entry.path())?;
        debug!("Packing {} ({} bytes)", name, bytes.len());
        files.insert(name, hex::encode(bytes));
    }

    if !files.contains_key("meta.json") {
        return Err(IndexError::Corrupt("index directory has no meta.json".to_string()));
    }

    Ok(SerializedIndex {
        format: SERIALIZATION_FORMAT,
        files,
    })
}

fn is_lock_file(name: &str) -> bool {
    name.starts_with(".tantivy-") && name.ends_with(".lock")
}

/// Persists a built index, its metadata map, a build timestamp and the
/// config hash in a single write
pub fn persist(
    store: &mut dyn KeyValueStore,
    built: &BuiltIndex,
    config_hash: Option<&str>,
) -> Result<(), CrawlError> {
    let record = PersistedIndex {
        index: serde_json::to_string(&built.index).map_err(IndexError::from)?,
        documents: serde_json::to_string(&built.metadata).map_err(IndexError::from)?,
        created_at: Utc::now(),
        config_hash: config_hash.map(str::to_string),
    };
    save_index(store, &record)?;
    info!("Persisted index with {} documents", built.document_count());
    Ok(())
}
