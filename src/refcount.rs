// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Grouped reference-count store used by the disk backend.
//!
//! Node ids are partitioned into fixed-size groups of [`GROUP_SIZE`]
//! consecutive ids. Each group is represented on disk as one small binary
//! file; a group that has never been touched is never written and reads
//! back as all-zero counts. This keeps the refcount table sparse: a forest
//! with a handful of live nodes does not need a file covering the entire
//! id space.

use crate::node::NodeId;
use std::collections::{HashMap, HashSet};

/// Number of consecutive node ids covered by one on-disk group file.
pub const GROUP_SIZE: u64 = 32768;

/// In-memory view over the grouped refcount table.
///
/// This does not perform any I/O itself; callers load group contents with
/// [`decode_group`] and persist dirty groups with [`encode_group`], letting
/// the backend decide storage details (paths, temp-file renames, etc).
#[derive(Debug, Default)]
pub struct RefcountStore {
    counts: HashMap<NodeId, u16>,
    dirty: HashSet<NodeId>,
    loaded_groups: HashSet<u64>,
}

impl RefcountStore {
    pub fn new() -> Self {
        RefcountStore::default()
    }

    /// The group id (its start id divided by [`GROUP_SIZE`]) that contains
    /// `id`.
    pub fn group_of(id: NodeId) -> u64 {
        id / GROUP_SIZE
    }

    /// First id covered by the group containing `id`.
    pub fn group_start(id: NodeId) -> u64 {
        Self::group_of(id) * GROUP_SIZE
    }

    pub fn is_group_loaded(&self, group: u64) -> bool {
        self.loaded_groups.contains(&group)
    }

    pub fn mark_group_loaded(&mut self, group: u64) {
        self.loaded_groups.insert(group);
    }

    /// Get the refcount for `id`. Returns 0 for an id whose group has not
    /// been loaded via [`Self::load_group_from_bytes`] (or touched by
    /// [`Self::set`]) — callers are expected to load the owning group
    /// first if on-disk state might exist.
    pub fn get(&self, id: NodeId) -> u16 {
        *self.counts.get(&id).unwrap_or(&0)
    }

    /// Set the refcount for `id`, marking it dirty. A count of zero drops
    /// the cached entry (it will encode back out as zero regardless).
    pub fn set(&mut self, id: NodeId, count: u16) {
        if count == 0 {
            self.counts.remove(&id);
        } else {
            self.counts.insert(id, count);
        }
        self.dirty.insert(id);
        self.loaded_groups.insert(Self::group_of(id));
    }

    /// Ids with pending changes since the last [`Self::clear_dirty`].
    pub fn dirty_groups(&self) -> HashSet<u64> {
        self.dirty.iter().map(|id| Self::group_of(*id)).collect()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Load a group's contents from a decoded binary group, without
    /// marking those entries dirty. Entries already dirty in memory take
    /// precedence over the on-disk values being loaded.
    pub fn load_group_from_bytes(&mut self, bytes: &[u8]) -> Result<(), crate::error::TreeError> {
        let (start, values) = decode_group(bytes)?;
        for (offset, count) in values.into_iter().enumerate() {
            let id = start + offset as u64;
            if self.dirty.contains(&id) {
                continue;
            }
            if count == 0 {
                self.counts.remove(&id);
            } else {
                self.counts.insert(id, count);
            }
        }
        self.loaded_groups.insert(start / GROUP_SIZE);
        Ok(())
    }

    /// Encode the group starting at `start` into its binary representation,
    /// for persistence.
    pub fn encode_group(&self, start: u64) -> Vec<u8> {
        let mut values = vec![0u16; GROUP_SIZE as usize];
        for (offset, value) in values.iter_mut().enumerate() {
            let id = start + offset as u64;
            *value = self.get(id);
        }
        encode_group(start, &values)
    }

    pub fn list_nonzero(&self) -> impl Iterator<Item = (NodeId, u16)> + '_ {
        self.counts.iter().map(|(id, count)| (*id, *count))
    }
}

/// Encode a full group (`start`, `start + GROUP_SIZE - 1`) into its binary
/// layout: 8-byte start id, 2-byte group length, then `GROUP_SIZE`
/// big-endian 16-bit counts.
pub fn encode_group(start: u64, values: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 2 + values.len() * 2);
    out.extend_from_slice(&start.to_be_bytes());
    out.extend_from_slice(&(values.len() as u16).to_be_bytes());
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Decode a binary group back into its start id and counts.
pub fn decode_group(bytes: &[u8]) -> Result<(u64, Vec<u16>), crate::error::TreeError> {
    if bytes.len() < 10 {
        return Err(crate::error::TreeError::CodecError {
            reason: "refcount group shorter than its header".to_string(),
        });
    }
    let start = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let len = u16::from_be_bytes(bytes[8..10].try_into().unwrap()) as usize;
    let expected = 10 + len * 2;
    if bytes.len() != expected {
        return Err(crate::error::TreeError::CodecError {
            reason: format!(
                "refcount group declares {} entries but has {} bytes",
                len,
                bytes.len()
            ),
        });
    }
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        let offset = 10 + i * 2;
        values.push(u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()));
    }
    Ok((start, values))
}
