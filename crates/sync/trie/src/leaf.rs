use crate::error::DecodeError;
use alloy_primitives::{B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use auto_impl::auto_impl;

/// An account as stored in the leaves of the account trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable)]
pub struct TrieAccount {
    /// Account nonce.
    pub nonce: u64,
    /// Account balance.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    /// Hash of the account's bytecode.
    pub code_hash: B256,
}

/// Content referenced by an account trie leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafRefs {
    /// Root of the storage trie belonging to the leaf.
    pub storage_root: B256,
    /// Hash of the code belonging to the leaf.
    pub code_hash: B256,
}

/// Extracts the sub-trie root and code hash from the value of an account trie leaf.
///
/// Implementations are pure. The [`Scheduler`](crate::Scheduler) registers the returned hashes,
/// a decoder never schedules anything itself.
#[auto_impl(&, Arc, Box)]
pub trait LeafDecoder: Send + Sync {
    /// Decodes the raw leaf value.
    fn decode(&self, leaf: &[u8]) -> Result<LeafRefs, DecodeError>;
}

/// Decodes RLP encoded [`TrieAccount`] leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLeafDecoder;

impl LeafDecoder for AccountLeafDecoder {
    fn decode(&self, mut leaf: &[u8]) -> Result<LeafRefs, DecodeError> {
        let account = TrieAccount::decode(&mut leaf)?;
        if !leaf.is_empty() {
            return Err(DecodeError::TrailingBytes(leaf.len()))
        }
        Ok(LeafRefs { storage_root: account.storage_root, code_hash: account.code_hash })
    }
}
