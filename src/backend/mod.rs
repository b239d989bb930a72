// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The backend contract a [`crate::tree::BTree`] and [`crate::forest::Forest`]
//! rely on, plus the two concrete implementations shipped in this crate.
//!
//! ## Implementations
//!
//! - [`memory::MemoryBackend`]: everything held in process memory; used for
//!   unit and property tests.
//! - [`disk::DiskBackend`]: nodes stored as one file per block under a
//!   balanced directory hierarchy, with a journal giving atomic commits.

pub mod cache;
pub mod disk;
pub mod idpath;
pub mod journal;
pub mod memory;
pub mod upload_queue;

use crate::error::TreeResult;
use crate::node::{Node, NodeId};

/// Operations a B-tree forest needs from its storage layer.
///
/// Implementors own all mutable state: node blocks, refcounts, and forest
/// metadata. A [`crate::tree::BTree`] never touches storage directly except
/// through this trait.
pub trait Backend {
    /// Fixed size, in bytes, of every encoded node block.
    fn block_size(&self) -> usize;

    /// Largest value size guaranteed to fit a single-pair leaf.
    fn max_value_size(&self) -> usize;

    /// Fetch a node by id. Fails with [`crate::error::TreeError::NodeMissing`]
    /// if no block with that id exists.
    fn get_node(&mut self, id: NodeId) -> TreeResult<Node>;

    /// Persist `node`, replacing any existing block with the same id.
    /// Marks the node frozen.
    fn put_node(&mut self, node: Node) -> TreeResult<()>;

    /// Remove the block for `id`. Fails with `NodeMissing` if absent.
    fn remove_node(&mut self, id: NodeId) -> TreeResult<()>;

    /// All node ids currently present.
    fn list_nodes(&mut self) -> TreeResult<Vec<NodeId>>;

    /// Whether the node with refcount-tracked id `id` may be modified in
    /// place (its refcount is exactly one).
    fn can_be_modified(&mut self, id: NodeId) -> TreeResult<bool>;

    fn get_refcount(&mut self, id: NodeId) -> TreeResult<u16>;
    fn set_refcount(&mut self, id: NodeId, count: u16) -> TreeResult<()>;
    fn save_refcounts(&mut self) -> TreeResult<()>;

    fn get_metadata(&mut self, key: &str) -> TreeResult<Option<String>>;
    fn set_metadata(&mut self, key: &str, value: &str) -> TreeResult<()>;
    fn remove_metadata(&mut self, key: &str) -> TreeResult<()>;
    fn metadata_keys(&mut self) -> TreeResult<Vec<String>>;
    fn save_metadata(&mut self) -> TreeResult<()>;

    /// Flush every pending change durably. For the disk backend this is the
    /// single atomic commit point; for the memory backend it is a no-op.
    fn commit(&mut self) -> TreeResult<()>;
}
