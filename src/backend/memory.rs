// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! An in-process [`Backend`] over plain `HashMap`s.
//!
//! Nothing here is persisted; it exists for unit tests, property tests, and
//! demos that don't need a filesystem round-trip.

use super::Backend;
use crate::error::{TreeError, TreeResult};
use crate::node::{Node, NodeId};
use std::collections::HashMap;

#[derive(Debug)]
pub struct MemoryBackend {
    block_size: usize,
    key_size: usize,
    nodes: HashMap<NodeId, Node>,
    refcounts: HashMap<NodeId, u16>,
    metadata: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new(key_size: usize, block_size: usize) -> Self {
        MemoryBackend {
            block_size,
            key_size,
            nodes: HashMap::new(),
            refcounts: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }
}

impl Backend for MemoryBackend {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn max_value_size(&self) -> usize {
        self.block_size / 2 - 16
    }

    fn get_node(&mut self, id: NodeId) -> TreeResult<Node> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(TreeError::NodeMissing { id })
    }

    fn put_node(&mut self, mut node: Node) -> TreeResult<()> {
        node.set_state(crate::node::NodeState::Frozen);
        self.nodes.insert(node.id(), node);
        Ok(())
    }

    fn remove_node(&mut self, id: NodeId) -> TreeResult<()> {
        self.nodes.remove(&id).ok_or(TreeError::NodeMissing { id })?;
        Ok(())
    }

    fn list_nodes(&mut self) -> TreeResult<Vec<NodeId>> {
        Ok(self.nodes.keys().copied().collect())
    }

    fn can_be_modified(&mut self, id: NodeId) -> TreeResult<bool> {
        Ok(self.get_refcount(id)? == 1)
    }

    fn get_refcount(&mut self, id: NodeId) -> TreeResult<u16> {
        Ok(*self.refcounts.get(&id).unwrap_or(&0))
    }

    fn set_refcount(&mut self, id: NodeId, count: u16) -> TreeResult<()> {
        if count == 0 {
            self.refcounts.remove(&id);
        } else {
            self.refcounts.insert(id, count);
        }
        Ok(())
    }

    fn save_refcounts(&mut self) -> TreeResult<()> {
        Ok(())
    }

    fn get_metadata(&mut self, key: &str) -> TreeResult<Option<String>> {
        Ok(self.metadata.get(key).cloned())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> TreeResult<()> {
        self.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_metadata(&mut self, key: &str) -> TreeResult<()> {
        self.metadata.remove(key);
        Ok(())
    }

    fn metadata_keys(&mut self) -> TreeResult<Vec<String>> {
        Ok(self.metadata.keys().cloned().collect())
    }

    fn save_metadata(&mut self) -> TreeResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> TreeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Leaf;

    #[test]
    fn put_then_get_round_trip() {
        let mut backend = MemoryBackend::new(3, 64);
        let leaf = Leaf::new(1);
        backend.put_node(Node::Leaf(leaf)).unwrap();
        let got = backend.get_node(1).unwrap();
        assert_eq!(got.id(), 1);
    }

    #[test]
    fn missing_node_is_an_error() {
        let mut backend = MemoryBackend::new(3, 64);
        match backend.get_node(99) {
            Err(TreeError::NodeMissing { id }) => assert_eq!(id, 99),
            other => panic!("expected NodeMissing, got {:?}", other),
        }
    }

    #[test]
    fn refcount_zero_clears_entry() {
        let mut backend = MemoryBackend::new(3, 64);
        backend.set_refcount(5, 2).unwrap();
        assert_eq!(backend.get_refcount(5).unwrap(), 2);
        backend.set_refcount(5, 0).unwrap();
        assert_eq!(backend.get_refcount(5).unwrap(), 0);
    }
}
