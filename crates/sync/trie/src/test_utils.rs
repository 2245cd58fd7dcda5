//! Test helpers for trie sync: an in-memory store and real RLP encoded tries.

use crate::{
    error::StoreError,
    leaf::TrieAccount,
    store::StateStore,
};
use alloy_primitives::{keccak256, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header, EMPTY_STRING_CODE};
use hyk_sync_primitives::{EMPTY_ROOT_HASH, KECCAK_EMPTY};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

/// An in-memory [`StateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    content: Arc<RwLock<HashMap<B256, Bytes>>>,
    batches: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates a store holding the given content.
    pub fn with_content(content: impl IntoIterator<Item = (B256, Bytes)>) -> Self {
        let store = Self::default();
        store.content.write().extend(content);
        store
    }

    /// Inserts content directly.
    pub fn insert(&self, hash: B256, data: Bytes) {
        self.content.write().insert(hash, data);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.content.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }

    /// Number of successful batch writes.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Makes all following writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of the stored content.
    pub fn content(&self) -> HashMap<B256, Bytes> {
        self.content.read().clone()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, hash: &B256) -> Result<Option<Bytes>, StoreError> {
        Ok(self.content.read().get(hash).cloned())
    }

    fn write_batch(&self, entries: &[(B256, Bytes)]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError("write failure".to_string()))
        }
        self.content.write().extend(entries.iter().cloned());
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A child slot of a trie node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeRef {
    /// No child.
    #[default]
    Empty,
    /// Child stored under its hash.
    Hash(B256),
    /// Child embedded in the parent.
    Inline(Bytes),
}

impl NodeRef {
    /// References an encoded node the way the trie does: inline if shorter than a hash.
    pub fn for_node(raw: &Bytes) -> Self {
        if raw.len() < 32 {
            Self::Inline(raw.clone())
        } else {
            Self::Hash(keccak256(raw))
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Empty => out.push(EMPTY_STRING_CODE),
            Self::Hash(hash) => hash.encode(out),
            Self::Inline(raw) => out.extend_from_slice(raw),
        }
    }
}

/// Hex-prefix encodes a nibble path.
pub fn hex_prefix(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let odd = nibbles.len() % 2 == 1;
    let flag = (u8::from(leaf) << 1) | u8::from(odd);
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if odd {
        out.push((flag << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    out.extend(rest.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
    out
}

fn list(payload: Vec<u8>) -> Bytes {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out.into()
}

/// Encodes a leaf node.
pub fn encode_leaf(nibbles: &[u8], value: &[u8]) -> Bytes {
    let mut payload = Vec::new();
    hex_prefix(nibbles, true).as_slice().encode(&mut payload);
    value.encode(&mut payload);
    list(payload)
}

/// Encodes an extension node.
pub fn encode_extension(nibbles: &[u8], child: NodeRef) -> Bytes {
    let mut payload = Vec::new();
    hex_prefix(nibbles, false).as_slice().encode(&mut payload);
    child.encode_into(&mut payload);
    list(payload)
}

/// Encodes a branch node.
pub fn encode_branch(children: &[NodeRef; 16], value: &[u8]) -> Bytes {
    let mut payload = Vec::new();
    for child in children {
        child.encode_into(&mut payload);
    }
    value.encode(&mut payload);
    list(payload)
}

/// An account of a [`TrieFixture`].
#[derive(Debug, Clone, Default)]
pub struct FixtureAccount {
    /// Account nonce.
    pub nonce: u64,
    /// Account code.
    pub code: Option<Bytes>,
    /// Storage slot values. At most 16.
    pub storage: Vec<Bytes>,
}

impl FixtureAccount {
    /// An account without code and storage.
    pub fn plain(nonce: u64) -> Self {
        Self { nonce, ..Default::default() }
    }

    /// Sets the code.
    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the storage values.
    pub fn with_storage(mut self, storage: Vec<Bytes>) -> Self {
        self.storage = storage;
        self
    }
}

/// A complete state built from real RLP encoded trie nodes.
///
/// Every trie is either a single leaf or a branch with one leaf per first nibble, so at most 16
/// accounts and 16 storage slots per account are supported.
#[derive(Debug, Clone)]
pub struct TrieFixture {
    root: B256,
    nodes: HashMap<B256, Bytes>,
    codes: HashMap<B256, Bytes>,
}

impl TrieFixture {
    /// Builds the state for the accounts.
    pub fn new(accounts: Vec<FixtureAccount>) -> Self {
        let mut nodes = HashMap::new();
        let mut codes = HashMap::new();

        let mut leaves = Vec::with_capacity(accounts.len());
        for (idx, account) in accounts.into_iter().enumerate() {
            let storage = account
                .storage
                .iter()
                .enumerate()
                .map(|(slot, value)| {
                    let mut encoded = Vec::new();
                    value.encode(&mut encoded);
                    (key_nibbles(slot, keccak256([idx as u8, slot as u8])), encoded)
                })
                .collect();
            let storage_root = build_trie(storage, &mut nodes);

            let code_hash = match account.code {
                Some(code) => {
                    let hash = keccak256(&code);
                    codes.insert(hash, code);
                    hash
                }
                None => KECCAK_EMPTY,
            };
            let trie_account = TrieAccount {
                nonce: account.nonce,
                balance: U256::from(idx as u64 + 1),
                storage_root,
                code_hash,
            };
            let key = key_nibbles(idx, keccak256([idx as u8]));
            leaves.push((key, alloy_rlp::encode(trie_account)));
        }
        let root = build_trie(leaves, &mut nodes);

        Self { root, nodes, codes }
    }

    /// Root of the account trie.
    pub const fn root(&self) -> B256 {
        self.root
    }

    /// All trie nodes, account and storage.
    pub const fn nodes(&self) -> &HashMap<B256, Bytes> {
        &self.nodes
    }

    /// All code blobs.
    pub const fn codes(&self) -> &HashMap<B256, Bytes> {
        &self.codes
    }

    /// Looks up a node or code blob.
    pub fn get(&self, hash: &B256) -> Option<Bytes> {
        self.nodes.get(hash).or_else(|| self.codes.get(hash)).cloned()
    }

    /// All content of the state.
    pub fn content(&self) -> HashMap<B256, Bytes> {
        self.nodes.iter().chain(self.codes.iter()).map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Number of distinct hashes in the state.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.codes.len()
    }

    /// Returns `true` for the empty state.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 64 nibble key derived from `seed`, with `first` as the first nibble.
fn key_nibbles(first: usize, seed: B256) -> Vec<u8> {
    let mut nibbles = seed.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect::<Vec<_>>();
    nibbles[0] = first as u8;
    nibbles
}

fn build_trie(leaves: Vec<(Vec<u8>, Vec<u8>)>, nodes: &mut HashMap<B256, Bytes>) -> B256 {
    let mut insert = |raw: Bytes| {
        let hash = keccak256(&raw);
        nodes.insert(hash, raw);
        hash
    };
    match leaves.len() {
        0 => EMPTY_ROOT_HASH,
        1 => insert(encode_leaf(&leaves[0].0, &leaves[0].1)),
        _ => {
            assert!(leaves.len() <= 16, "fixture tries hold at most 16 leaves");
            let mut children: [NodeRef; 16] = Default::default();
            for (key, value) in &leaves {
                let leaf = encode_leaf(&key[1..], value);
                let child = NodeRef::for_node(&leaf);
                if let NodeRef::Hash(_) = child {
                    insert(leaf);
                }
                children[key[0] as usize] = child;
            }
            insert(encode_branch(&children, &[]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_prefix_encoding() {
        assert_eq!(hex_prefix(&[1, 2, 3, 4, 5], false), vec![0x11, 0x23, 0x45]);
        assert_eq!(hex_prefix(&[0, 1, 2, 3, 4, 5], false), vec![0x00, 0x01, 0x23, 0x45]);
        assert_eq!(hex_prefix(&[0xf, 0x1, 0xc, 0xb, 0x8], true), vec![0x3f, 0x1c, 0xb8]);
        assert_eq!(hex_prefix(&[0x0, 0xf, 0x1, 0xc, 0xb, 0x8], true), vec![0x20, 0x0f, 0x1c, 0xb8]);
    }

    #[test]
    fn fixture_shape() {
        let fixture = TrieFixture::new(vec![
            FixtureAccount::plain(0).with_code(Bytes::from_static(b"code")),
            FixtureAccount::plain(1).with_storage(vec![Bytes::from_static(b"a")]),
        ]);
        // root branch, two account leaves, one single-leaf storage trie
        assert_eq!(fixture.nodes().len(), 4);
        assert_eq!(fixture.codes().len(), 1);
        assert!(fixture.get(&fixture.root()).is_some());
    }

    #[test]
    fn empty_fixture() {
        let fixture = TrieFixture::new(Vec::new());
        assert_eq!(fixture.root(), EMPTY_ROOT_HASH);
        assert!(fixture.is_empty());
    }
}
