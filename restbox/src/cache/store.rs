//! In-memory map from cache key to cached response.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use restbox_core::{CacheKey, RawResponse};

/// A stored response together with the moment it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    response: Arc<RawResponse>,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Wraps a response stamped with the current time.
    pub fn new(response: Arc<RawResponse>) -> Self {
        Self {
            response,
            stored_at: Utc::now(),
        }
    }

    /// Returns the shared response.
    pub fn response(&self) -> &Arc<RawResponse> {
        &self.response
    }

    /// Returns when the entry was written.
    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.stored_at
    }
}

/// Unbounded key-value store of cached responses.
///
/// Entries live until an eviction timer fires, an evicting request removes
/// them, or the store is cleared. Nothing is persisted.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry stored under `key`.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Stores an entry, returning the one it replaced.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(key, entry)
    }

    /// Removes the entry stored under `key`.
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Removes every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns `true` when an entry is stored under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
