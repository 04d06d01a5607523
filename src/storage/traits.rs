//! Storage traits
//!
//! This module defines the trait interface for storage backends.

use crate::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for key/value storage backends
///
/// Values are opaque strings; callers own their encoding.
pub trait KeyValueStore {
    /// Reads a value, `None` if the key was never written
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a single value, replacing any previous one
    fn put(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Writes `entries` and removes `removed` so that either all or none of
    /// the changes become visible
    ///
    /// Removing a missing key is not an error.
    fn write_batch(&mut self, entries: &[(&str, String)], removed: &[&str]) -> StorageResult<()>;

    /// Returns true if the key has a value
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
