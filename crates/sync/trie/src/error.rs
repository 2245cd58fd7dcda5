use alloy_primitives::B256;
use hyk_sync_primitives::GotExpected;

/// Result alias for scheduler operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The delivered content does not hash to the requested hash.
    ///
    /// The content is discarded and the item is requested again.
    #[error("content hash mismatch: {0}")]
    HashMismatch(GotExpected<B256>),
    /// The delivered hash is not currently in flight.
    #[error("received {0} which is not in flight")]
    NotRequested(B256),
    /// Verified content could not be decoded. The state root can't be trusted anymore.
    #[error("failed to decode {hash}: {error}")]
    DecodeFailure {
        /// Hash of the content that failed to decode.
        hash: B256,
        /// The decoding error.
        #[source]
        error: DecodeError,
    },
    /// A root was added after the sync completed.
    #[error("sync already completed")]
    AlreadyComplete,
    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Returns `true` if the error terminates the whole sync.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DecodeFailure { .. })
    }
}

/// Errors that can occur while decoding a trie node or an account leaf.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Malformed RLP.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// A trie node must be an RLP list.
    #[error("trie node is not an rlp list")]
    NotAList,
    /// Trie nodes have either 2 (leaf, extension) or 17 (branch) items.
    #[error("trie node has {0} items, expected 2 or 17")]
    UnexpectedItemCount(usize),
    /// The hex-prefix flag nibble is out of range.
    #[error("invalid hex-prefix flag {0}")]
    InvalidPathFlag(u8),
    /// An even-length hex-prefix path with a non-zero padding nibble.
    #[error("non-canonical hex-prefix byte {0:#04x}")]
    NonCanonicalPath(u8),
    /// Leaf and extension nodes always carry a hex-prefix encoded path.
    #[error("empty hex-prefix path")]
    EmptyPath,
    /// A child reference is neither empty, a hash, nor an embedded node.
    #[error("invalid child reference of {0} bytes")]
    InvalidReference(usize),
    /// Embedded nodes must be shorter than a hash.
    #[error("embedded node of {0} bytes exceeds the inline limit")]
    OversizedEmbeddedNode(usize),
    /// Input continues after the encoded value.
    #[error("{0} trailing bytes after rlp payload")]
    TrailingBytes(usize),
}

/// Error reported by a [`StateStore`](crate::StateStore) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state store error: {0}")]
pub struct StoreError(pub String);

/// Errors related to skip filter checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// Failed to read or write the checkpoint file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Failed to encode or decode the checkpoint.
    #[error("failed to encode skip filter checkpoint: {0}")]
    Encoding(#[from] bincode::Error),
    /// The checkpoint is internally inconsistent.
    #[error("invalid skip filter checkpoint: {0}")]
    InvalidCheckpoint(&'static str),
}
