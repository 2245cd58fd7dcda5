//! Durable storage interface and the staging buffer in front of it.

use crate::error::StoreError;
use alloy_primitives::{Bytes, B256};
use auto_impl::auto_impl;
use std::collections::HashMap;

/// Durable content-addressed key value store the synced state is written to.
#[auto_impl(&, Arc, Box)]
pub trait StateStore: Send + Sync {
    /// Returns `true` if content for the hash is stored.
    fn contains(&self, hash: &B256) -> Result<bool, StoreError> {
        Ok(self.get(hash)?.is_some())
    }

    /// Returns the content stored under the hash.
    fn get(&self, hash: &B256) -> Result<Option<Bytes>, StoreError>;

    /// Writes all entries atomically.
    fn write_batch(&self, entries: &[(B256, Bytes)]) -> Result<(), StoreError>;
}

/// Append-only buffer of verified content that has not been written to the [`StateStore`] yet.
#[derive(Debug, Default)]
pub struct StagingStore {
    entries: Vec<(B256, Bytes)>,
    index: HashMap<B256, usize>,
    size: usize,
}

impl StagingStore {
    /// Stages the content. Returns `false` if the hash is already staged.
    pub fn insert(&mut self, hash: B256, data: Bytes) -> bool {
        if self.index.contains_key(&hash) {
            return false
        }
        self.size += data.len();
        self.index.insert(hash, self.entries.len());
        self.entries.push((hash, data));
        true
    }

    /// Returns `true` if the hash is staged.
    pub fn contains(&self, hash: &B256) -> bool {
        self.index.contains_key(hash)
    }

    /// Returns the staged content for the hash.
    pub fn get(&self, hash: &B256) -> Option<&Bytes> {
        self.index.get(hash).map(|idx| &self.entries[*idx].1)
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of the staged content in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Iterates over the staged entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(B256, Bytes)> {
        self.entries.iter()
    }

    /// Writes all staged entries to the store as one batch and clears the buffer.
    ///
    /// On error nothing is cleared.
    pub fn flush_into<S: StateStore>(&mut self, store: &S) -> Result<usize, StoreError> {
        if self.entries.is_empty() {
            return Ok(0)
        }
        store.write_batch(&self.entries)?;
        let written = self.entries.len();
        self.entries.clear();
        self.index.clear();
        self.size = 0;
        Ok(written)
    }
}
