// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Block codec: encodes and decodes [`Node`]s to and from fixed-size byte
//! blocks.
//!
//! ## Layout
//!
//! Both block kinds share a 16-byte header: a 4-byte magic cookie, the
//! node's 64-bit id, and a 32-bit pair count, all big-endian.
//!
//! - Leaf: header, then `num_pairs` keys back to back, then `num_pairs`
//!   32-bit value lengths, then the value bytes back to back.
//! - Index: header, then `num_pairs` keys back to back, then `num_pairs`
//!   64-bit child ids.
//!
//! The size-delta helpers let the tree predict whether an edit will
//! overflow a block without re-encoding the whole node, which is what
//! drives the split-or-not decision during insert.

use crate::error::TreeError;
use crate::node::{Index, Leaf, Node, NodeId, NodeState};

/// Magic cookie at the start of every leaf block.
pub const LEAF_MAGIC: [u8; 4] = *b"ORBL";
/// Magic cookie at the start of every index block.
pub const INDEX_MAGIC: [u8; 4] = *b"ORBI";

const HEADER_SIZE: usize = 4 + 8 + 4;

/// Encodes and decodes nodes for a forest with a fixed `key_size`.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    key_size: usize,
    block_size: usize,
}

impl Codec {
    pub fn new(key_size: usize, block_size: usize) -> Self {
        Codec { key_size, block_size }
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Largest value that is guaranteed to fit a single-pair leaf.
    pub fn max_value_size(&self) -> usize {
        self.block_size / 2 - HEADER_SIZE
    }

    /// Largest number of (key, child-id) pairs an index node may hold.
    pub fn max_index_pairs(&self) -> usize {
        (self.block_size - HEADER_SIZE) / (self.key_size + 8)
    }

    /// Exact encoded size of a leaf with the given keys and values.
    pub fn leaf_size(&self, values: &[Vec<u8>]) -> usize {
        let num_pairs = values.len();
        let values_len: usize = values.iter().map(|v| v.len()).sum();
        HEADER_SIZE + num_pairs * self.key_size + num_pairs * 4 + values_len
    }

    /// Predicted size after adding a new (key, value) pair, without
    /// re-encoding.
    pub fn leaf_size_delta_add(&self, old_size: usize, new_value: &[u8]) -> usize {
        old_size + self.key_size + 4 + new_value.len()
    }

    /// Predicted size after replacing `old_value` with `new_value` at an
    /// existing key, without re-encoding.
    pub fn leaf_size_delta_replace(
        &self,
        old_size: usize,
        old_value: &[u8],
        new_value: &[u8],
    ) -> usize {
        old_size - old_value.len() + new_value.len()
    }

    /// Exact encoded size of an index with `num_pairs` entries.
    pub fn index_size(&self, num_pairs: usize) -> usize {
        HEADER_SIZE + num_pairs * self.key_size + num_pairs * 8
    }

    pub fn encode(&self, node: &Node) -> Result<Vec<u8>, TreeError> {
        match node {
            Node::Leaf(l) => self.encode_leaf(l),
            Node::Index(i) => self.encode_index(i),
        }
    }

    pub fn encode_leaf(&self, leaf: &Leaf) -> Result<Vec<u8>, TreeError> {
        let size = self.leaf_size(&leaf.values);
        if size > self.block_size {
            return Err(TreeError::NodeTooBig {
                id: leaf.id,
                size,
                max: self.block_size,
            });
        }
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&LEAF_MAGIC);
        out.extend_from_slice(&leaf.id.to_be_bytes());
        out.extend_from_slice(&(leaf.keys.len() as u32).to_be_bytes());
        for key in &leaf.keys {
            out.extend_from_slice(key);
        }
        for value in &leaf.values {
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        }
        for value in &leaf.values {
            out.extend_from_slice(value);
        }
        Ok(out)
    }

    pub fn encode_index(&self, index: &Index) -> Result<Vec<u8>, TreeError> {
        let size = self.index_size(index.keys.len());
        if size > self.block_size {
            return Err(TreeError::NodeTooBig {
                id: index.id,
                size,
                max: self.block_size,
            });
        }
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&INDEX_MAGIC);
        out.extend_from_slice(&index.id.to_be_bytes());
        out.extend_from_slice(&(index.keys.len() as u32).to_be_bytes());
        for key in &index.keys {
            out.extend_from_slice(key);
        }
        for child in &index.child_ids {
            out.extend_from_slice(&child.to_be_bytes());
        }
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Node, TreeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(TreeError::CodecError {
                reason: format!("block of {} bytes is shorter than the header", bytes.len()),
            });
        }
        let cookie = &bytes[0..4];
        if cookie == LEAF_MAGIC {
            self.decode_leaf(bytes).map(Node::Leaf)
        } else if cookie == INDEX_MAGIC {
            self.decode_index(bytes).map(Node::Index)
        } else {
            Err(TreeError::CodecError {
                reason: format!("unrecognized magic cookie {:?}", cookie),
            })
        }
    }

    pub fn decode_leaf(&self, bytes: &[u8]) -> Result<Leaf, TreeError> {
        let id = read_u64(bytes, 4)?;
        let num_pairs = read_u32(bytes, 12)? as usize;
        let mut offset = HEADER_SIZE;

        let mut keys = Vec::with_capacity(num_pairs);
        for _ in 0..num_pairs {
            let key = read_slice(bytes, offset, self.key_size)?;
            keys.push(key.to_vec());
            offset += self.key_size;
        }

        let mut value_lens = Vec::with_capacity(num_pairs);
        for _ in 0..num_pairs {
            value_lens.push(read_u32(bytes, offset)? as usize);
            offset += 4;
        }

        let mut values = Vec::with_capacity(num_pairs);
        for len in value_lens {
            let value = read_slice(bytes, offset, len)?;
            values.push(value.to_vec());
            offset += len;
        }

        Ok(Leaf {
            id,
            keys,
            values,
            state: NodeState::Frozen,
        })
    }

    pub fn decode_index(&self, bytes: &[u8]) -> Result<Index, TreeError> {
        let id = read_u64(bytes, 4)?;
        let num_pairs = read_u32(bytes, 12)? as usize;
        let mut offset = HEADER_SIZE;

        let mut keys = Vec::with_capacity(num_pairs);
        for _ in 0..num_pairs {
            let key = read_slice(bytes, offset, self.key_size)?;
            keys.push(key.to_vec());
            offset += self.key_size;
        }

        let mut child_ids = Vec::with_capacity(num_pairs);
        for _ in 0..num_pairs {
            child_ids.push(read_u64(bytes, offset)?);
            offset += 8;
        }

        Ok(Index {
            id,
            keys,
            child_ids,
            state: NodeState::Frozen,
        })
    }
}

fn read_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], TreeError> {
    bytes.get(offset..offset + len).ok_or_else(|| TreeError::CodecError {
        reason: format!("block truncated at offset {} (wanted {} bytes)", offset, len),
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, TreeError> {
    let slice = read_slice(bytes, offset, 4)?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, TreeError> {
    let slice = read_slice(bytes, offset, 8)?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

/// Node id embedded in an already-read block header, without fully
/// decoding the block. Used by the disk backend to sanity-check a block
/// read from the wrong path.
pub fn peek_id(bytes: &[u8]) -> Result<NodeId, TreeError> {
    read_u64(bytes, 4)
}
