//! Request and response types of the state data exchange.

use alloy_primitives::{Bytes, B256};

/// Identifies a request and its response.
pub type RequestId = u64;

/// Requests trie nodes or code blobs by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStateData {
    /// Id echoed by the response.
    pub request_id: RequestId,
    /// Hashes of the requested content.
    pub hashes: Vec<B256>,
}

/// Response to [`GetStateData`].
///
/// `data` holds one entry per requested hash, in request order. `None` marks content the peer
/// does not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateData {
    /// Id of the answered request.
    pub request_id: RequestId,
    /// The content.
    pub data: Vec<Option<Bytes>>,
}
