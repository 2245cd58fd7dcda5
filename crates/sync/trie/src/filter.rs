//! A bloom filter remembering committed content hashes.

use crate::{bitmap::AtomicBitmap, error::FilterError};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::debug;

/// Default size of the filter in bits (16 MiB).
pub const DEFAULT_SKIP_FILTER_BITS: usize = 1 << 27;

/// Default number of bit positions per hash.
pub const DEFAULT_SKIP_FILTER_HASHES: u32 = 4;

/// Upper bound for [`SkipFilterConfig::hashes`].
const MAX_HASHES: u32 = 16;

/// Lower bound for [`SkipFilterConfig::bits`].
const MIN_BITS: usize = 64;

/// Sizing of the [`SkipFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SkipFilterConfig {
    /// Number of bits in the filter.
    pub bits: usize,
    /// Number of bit positions derived from every hash.
    pub hashes: u32,
}

impl Default for SkipFilterConfig {
    fn default() -> Self {
        Self { bits: DEFAULT_SKIP_FILTER_BITS, hashes: DEFAULT_SKIP_FILTER_HASHES }
    }
}

/// Probabilistic set of content hashes that were already committed.
///
/// `might_have` never reports a false negative for an added hash. A positive answer only means
/// the content is probably stored, callers confirm it before skipping any work.
///
/// Bit positions are derived by double hashing: the key is already a keccak digest, so the
/// first two big-endian words of it are used as the two independent hashes.
pub struct SkipFilter {
    bits: AtomicBitmap,
    hashes: u32,
    items: AtomicU64,
}

impl SkipFilter {
    /// Creates an empty filter.
    pub fn new(config: SkipFilterConfig) -> Self {
        Self {
            bits: AtomicBitmap::new(config.bits.max(MIN_BITS)),
            hashes: config.hashes.clamp(1, MAX_HASHES),
            items: AtomicU64::new(0),
        }
    }

    /// Returns `false` if the hash was definitely never added.
    pub fn might_have(&self, hash: &B256) -> bool {
        self.positions(hash).all(|bit| self.bits.is_set(bit, Ordering::Acquire))
    }

    /// Adds the hash to the filter.
    pub fn add(&self, hash: &B256) {
        let mut fresh = false;
        for bit in self.positions(hash) {
            fresh |= self.bits.set(bit, Ordering::AcqRel);
        }
        if fresh {
            self.items.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Approximate number of distinct hashes added.
    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }

    /// Returns the filter configuration.
    pub fn config(&self) -> SkipFilterConfig {
        SkipFilterConfig { bits: self.bits.len(), hashes: self.hashes }
    }

    fn positions(&self, hash: &B256) -> impl Iterator<Item = usize> {
        let (h1, h2) = split_hash(hash);
        let len = self.bits.len() as u64;
        (0..self.hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % len) as usize)
    }

    /// Takes a snapshot of the filter.
    pub fn checkpoint(&self) -> SkipFilterCheckpoint {
        SkipFilterCheckpoint {
            bits: self.bits.len() as u64,
            hashes: self.hashes,
            items: self.items(),
            words: self.bits.to_words(Ordering::Acquire),
        }
    }

    /// Restores a filter from a snapshot.
    pub fn from_checkpoint(checkpoint: SkipFilterCheckpoint) -> Result<Self, FilterError> {
        let SkipFilterCheckpoint { bits, hashes, items, words } = checkpoint;
        if hashes == 0 || hashes > MAX_HASHES {
            return Err(FilterError::InvalidCheckpoint("hash count out of range"))
        }
        let bits = usize::try_from(bits)
            .ok()
            .filter(|bits| *bits >= MIN_BITS)
            .ok_or(FilterError::InvalidCheckpoint("bit count out of range"))?;
        let bitmap = AtomicBitmap::from_words(bits, words)
            .ok_or(FilterError::InvalidCheckpoint("word count does not match bit count"))?;
        Ok(Self { bits: bitmap, hashes, items: AtomicU64::new(items) })
    }

    /// Writes a checkpoint of the filter to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FilterError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, &self.checkpoint())?;
        writer.flush()?;
        debug!(target: "sync::trie", path = %path.display(), items = self.items(), "Saved skip filter");
        Ok(())
    }

    /// Loads a filter from a checkpoint file written by [`SkipFilter::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let checkpoint: SkipFilterCheckpoint =
            bincode::deserialize_from(BufReader::new(File::open(path)?))?;
        let filter = Self::from_checkpoint(checkpoint)?;
        debug!(target: "sync::trie", path = %path.display(), items = filter.items(), "Loaded skip filter");
        Ok(filter)
    }
}

impl Default for SkipFilter {
    fn default() -> Self {
        Self::new(SkipFilterConfig::default())
    }
}

impl fmt::Debug for SkipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipFilter")
            .field("bits", &self.bits.len())
            .field("hashes", &self.hashes)
            .field("items", &self.items())
            .finish()
    }
}

/// Serializable snapshot of a [`SkipFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipFilterCheckpoint {
    /// Number of bits.
    pub bits: u64,
    /// Number of bit positions per hash.
    pub hashes: u32,
    /// Approximate number of added hashes.
    pub items: u64,
    /// The raw bitmap words.
    pub words: Vec<u64>,
}

#[inline]
fn split_hash(hash: &B256) -> (u64, u64) {
    let mut h1 = [0u8; 8];
    let mut h2 = [0u8; 8];
    h1.copy_from_slice(&hash[..8]);
    h2.copy_from_slice(&hash[8..16]);
    // an even step could cycle through a subset of positions
    (u64::from_be_bytes(h1), u64::from_be_bytes(h2) | 1)
}
