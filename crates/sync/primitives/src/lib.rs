//! Commonly used types for state sync.
//!
//! This crate contains the types shared between the trie sync scheduler and the peer fetching
//! layer: content kinds, peer identifiers and the well-known hashes that never need to be
//! downloaded.

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{b256, B512};
use std::fmt;

pub use alloy_primitives::{keccak256, Bytes, B256};

/// Alias for a peer identifier
pub type PeerId = B512;

/// Root hash of an empty trie: `keccak256(rlp(""))`.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Hash of empty code: `keccak256("")`.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Returns `true` if the hash denotes "no code" and must never be requested.
#[inline]
pub fn is_empty_code_hash(hash: &B256) -> bool {
    hash.is_zero() || *hash == KECCAK_EMPTY
}

/// Returns `true` if the hash denotes an empty trie and must never be requested.
#[inline]
pub fn is_empty_root(hash: &B256) -> bool {
    hash.is_zero() || *hash == EMPTY_ROOT_HASH
}

/// The kind of content served by peers.
///
/// Peers advertise which of these they serve, a request only ever contains one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContentKind {
    /// Trie nodes of the account trie or of a storage trie.
    #[default]
    Node,
    /// Contract bytecode.
    Code,
}

impl ContentKind {
    /// Returns true if this is [`ContentKind::Code`].
    pub const fn is_code(&self) -> bool {
        matches!(self, Self::Code)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Code => f.write_str("code"),
        }
    }
}

/// A pair of values, one of which is expected and one of which is actual.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
#[error("got {got}, expected {expected}")]
pub struct GotExpected<T> {
    /// The actual value.
    pub got: T,
    /// The expected value.
    pub expected: T,
}

impl<T> From<(T, T)> for GotExpected<T> {
    #[inline]
    fn from((got, expected): (T, T)) -> Self {
        Self::new(got, expected)
    }
}

impl<T> GotExpected<T> {
    /// Creates a new error from a pair of values.
    #[inline]
    pub const fn new(got: T, expected: T) -> Self {
        Self { got, expected }
    }
}

/// Generic wrapper with peer id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithPeerId<T>(PeerId, pub T);

impl<T> From<(PeerId, T)> for WithPeerId<T> {
    fn from(value: (PeerId, T)) -> Self {
        Self(value.0, value.1)
    }
}

impl<T> WithPeerId<T> {
    /// Wraps the value with the peerid.
    pub const fn new(peer: PeerId, value: T) -> Self {
        Self(peer, value)
    }

    /// Get the peer id
    pub const fn peer_id(&self) -> PeerId {
        self.0
    }

    /// Get the underlying data
    pub const fn data(&self) -> &T {
        &self.1
    }

    /// Returns ownership of the underlying data.
    pub fn into_data(self) -> T {
        self.1
    }

    /// Split the wrapper into [`PeerId`] and data tuple
    pub fn split(self) -> (PeerId, T) {
        (self.0, self.1)
    }
}
