use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed-size bitmap backed by `AtomicU64` words.
///
/// Bits are only ever set, so concurrent readers may observe a bit late but never lose one.
pub(crate) struct AtomicBitmap {
    len: usize,
    words: Box<[AtomicU64]>,
}

impl AtomicBitmap {
    const BITS: usize = 64;

    pub(crate) fn new(len: usize) -> Self {
        let num_words = len.div_ceil(Self::BITS);
        let words = (0..num_words).map(|_| AtomicU64::new(0)).collect();
        Self { len, words }
    }

    /// Restores a bitmap from its raw words. Returns `None` if the word count doesn't match.
    pub(crate) fn from_words(len: usize, words: Vec<u64>) -> Option<Self> {
        if words.len() != len.div_ceil(Self::BITS) {
            return None
        }
        Some(Self { len, words: words.into_iter().map(AtomicU64::new).collect() })
    }

    /// Number of bits.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    const fn word_and_mask(index: usize) -> (usize, u64) {
        (index >> 6, 1u64 << (index & 63))
    }

    /// Sets the bit, returns `true` if it was not set before.
    #[inline]
    pub(crate) fn set(&self, index: usize, ordering: Ordering) -> bool {
        let (w, mask) = Self::word_and_mask(index);
        self.words[w].fetch_or(mask, ordering) & mask == 0
    }

    #[inline]
    pub(crate) fn is_set(&self, index: usize, ordering: Ordering) -> bool {
        let (w, mask) = Self::word_and_mask(index);
        self.words[w].load(ordering) & mask != 0
    }

    /// Copies the raw words.
    pub(crate) fn to_words(&self, ordering: Ordering) -> Vec<u64> {
        self.words.iter().map(|word| word.load(ordering)).collect()
    }
}
