//! Decoding of Merkle-Patricia trie nodes into the references they contain.

use crate::{error::DecodeError, path::SyncPath};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Header, EMPTY_LIST_CODE};

/// Number of items in an encoded branch node.
const BRANCH_NODE_ITEMS: usize = 17;

/// Number of items in an encoded leaf or extension node.
const SHORT_NODE_ITEMS: usize = 2;

/// Something a trie node points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChild {
    /// A child node stored under its hash.
    Hash {
        /// Path of the child node.
        path: SyncPath,
        /// Hash of the child node.
        hash: B256,
    },
    /// A value held by a leaf, or by the value slot of a branch.
    Value {
        /// Full path of the value.
        path: SyncPath,
        /// The raw value.
        value: Bytes,
    },
}

/// Decodes a trie node and returns all hash references and values in it.
///
/// Embedded nodes (children shorter than 32 bytes stored inline) are decoded recursively, so the
/// result only ever contains hashes that need to be fetched and leaf values. `path` is the path
/// of the node itself.
pub fn node_children(raw: &[u8], path: &SyncPath) -> Result<Vec<NodeChild>, DecodeError> {
    let mut children = Vec::new();
    decode_node(raw, path, &mut children)?;
    Ok(children)
}

fn decode_node(
    raw: &[u8],
    path: &SyncPath,
    out: &mut Vec<NodeChild>,
) -> Result<(), DecodeError> {
    let mut buf = raw;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(DecodeError::NotAList)
    }
    if buf.len() > header.payload_length {
        return Err(DecodeError::TrailingBytes(buf.len() - header.payload_length))
    }

    let items = split_items(buf)?;
    match items.len() {
        SHORT_NODE_ITEMS => decode_short_node(items[0], items[1], path, out),
        BRANCH_NODE_ITEMS => {
            for (nibble, item) in (0u8..).zip(&items[..16]) {
                decode_reference(item, path.join(&[nibble]), true, out)?;
            }
            let value = string_payload(items[16])?;
            if !value.is_empty() {
                let value = Bytes::copy_from_slice(value);
                out.push(NodeChild::Value { path: path.clone(), value });
            }
            Ok(())
        }
        count => Err(DecodeError::UnexpectedItemCount(count)),
    }
}

fn decode_short_node(
    key: &[u8],
    value: &[u8],
    path: &SyncPath,
    out: &mut Vec<NodeChild>,
) -> Result<(), DecodeError> {
    let (is_leaf, nibbles) = decode_hex_prefix(string_payload(key)?)?;
    let path = path.join(&nibbles);
    if is_leaf {
        let value = Bytes::copy_from_slice(string_payload(value)?);
        out.push(NodeChild::Value { path, value });
        Ok(())
    } else {
        decode_reference(value, path, false, out)
    }
}

/// Decodes a child slot: empty, a 32 byte hash, or an embedded node.
fn decode_reference(
    item: &[u8],
    path: SyncPath,
    allow_empty: bool,
    out: &mut Vec<NodeChild>,
) -> Result<(), DecodeError> {
    if item.first().is_some_and(|first| *first >= EMPTY_LIST_CODE) {
        if item.len() >= B256::len_bytes() {
            return Err(DecodeError::OversizedEmbeddedNode(item.len()))
        }
        return decode_node(item, &path, out)
    }

    let payload = string_payload(item)?;
    match payload.len() {
        0 if allow_empty => Ok(()),
        32 => {
            out.push(NodeChild::Hash { path, hash: B256::from_slice(payload) });
            Ok(())
        }
        len => Err(DecodeError::InvalidReference(len)),
    }
}

/// Decodes a hex-prefix encoded path. Returns whether the node is a leaf and the nibbles.
fn decode_hex_prefix(key: &[u8]) -> Result<(bool, Vec<u8>), DecodeError> {
    let Some((&first, rest)) = key.split_first() else { return Err(DecodeError::EmptyPath) };
    let flag = first >> 4;
    if flag > 3 {
        return Err(DecodeError::InvalidPathFlag(flag))
    }

    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if flag & 1 == 1 {
        nibbles.push(first & 0x0f);
    } else if first & 0x0f != 0 {
        return Err(DecodeError::NonCanonicalPath(first))
    }
    for byte in rest {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    Ok((flag & 2 == 2, nibbles))
}

/// Splits a list payload into its encoded items.
fn split_items(mut payload: &[u8]) -> Result<Vec<&[u8]>, DecodeError> {
    let mut items = Vec::with_capacity(BRANCH_NODE_ITEMS);
    while !payload.is_empty() {
        let start = payload;
        let header = Header::decode(&mut payload)?;
        let item_len = start.len() - payload.len() + header.payload_length;
        if item_len > start.len() {
            return Err(alloy_rlp::Error::InputTooShort.into())
        }
        let (item, rest) = start.split_at(item_len);
        items.push(item);
        payload = rest;
    }
    Ok(items)
}

/// Returns the payload of an encoded string.
fn string_payload(mut item: &[u8]) -> Result<&[u8], DecodeError> {
    let header = Header::decode(&mut item)?;
    if header.list {
        return Err(alloy_rlp::Error::UnexpectedList.into())
    }
    item.get(..header.payload_length).ok_or(DecodeError::Rlp(alloy_rlp::Error::InputTooShort))
}
