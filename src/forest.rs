// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A forest of B-trees sharing one backend.
//!
//! Cloning a tree within a forest is O(1): [`Forest::new_tree`] given a
//! template copies only the template's root keys and child ids into a
//! fresh root node, bumping each shared child's refcount once. Nothing
//! below the root is touched until one of the two trees is edited.

use crate::backend::Backend;
use crate::error::{TreeError, TreeResult};
use crate::node::{Index, Node, NodeId};
use crate::tree::BTree;
use log::{debug, info};

const KEY_FORMAT: &str = "orb/1";
const META_FORMAT: &str = "format";
const META_KEY_SIZE: &str = "key_size";
const META_NODE_SIZE: &str = "node_size";
const META_LAST_ID: &str = "last_id";
const META_ROOT_IDS: &str = "root_ids";

/// A set of B-trees over a single backend, plus the id allocator and root
/// bookkeeping that ties them together as clones of one another.
pub struct Forest<B: Backend> {
    backend: B,
    key_size: usize,
    last_id: NodeId,
    trees: Vec<BTree>,
}

impl<B: Backend> Forest<B> {
    /// Returns a handle to the forest's backend, for direct inspection
    /// (e.g. `fsck`).
    pub fn backend(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn trees(&self) -> &[BTree] {
        &self.trees
    }

    pub fn tree(&self, index: usize) -> Option<&BTree> {
        self.trees.get(index)
    }

    pub fn tree_mut(&mut self, index: usize) -> Option<&mut BTree> {
        self.trees.get_mut(index)
    }

    /// Allocate a fresh node id. Exposed so callers that drive tree
    /// operations directly (rather than through forest helpers) can build
    /// their own allocator closure bound to the same counter.
    pub fn new_id(&mut self) -> NodeId {
        self.last_id += 1;
        self.last_id
    }

    pub fn last_id(&self) -> NodeId {
        self.last_id
    }

    /// Create a new tree, either empty or cloned from `template`.
    ///
    /// Cloning copies the template's root keys and child ids into a fresh
    /// root index, incrementing each shared child's refcount once; nothing
    /// below the root is touched. Returns the index of the new tree in
    /// [`Self::trees`].
    pub fn new_tree(&mut self, template: Option<usize>) -> TreeResult<usize> {
        let root_id = self.last_id + 1;
        self.last_id = root_id;

        let mut root = Index::new(root_id);
        if let Some(template_idx) = template {
            let template_root_id = self.trees[template_idx]
                .root_id()
                .expect("template tree always has a root index, even if empty");
            let template_root = match self.backend.get_node(template_root_id)? {
                Node::Index(idx) => idx,
                Node::Leaf(_) => unreachable!("tree root is always an index node"),
            };
            root.keys = template_root.keys.clone();
            root.child_ids = template_root.child_ids.clone();
            for &child_id in &root.child_ids {
                let rc = self.backend.get_refcount(child_id)?;
                self.backend.set_refcount(child_id, rc + 1)?;
            }
            debug!("cloned tree from root {} into new root {}", template_root_id, root_id);
        } else {
            debug!("created empty tree with root {}", root_id);
        }

        self.backend.put_node(Node::Index(root))?;
        self.backend.set_refcount(root_id, 1)?;
        self.trees.push(BTree::new(self.key_size, Some(root_id)));
        Ok(self.trees.len() - 1)
    }

    /// Remove a tree from the forest, cascading a decrement through its
    /// entire reachable node set.
    pub fn remove_tree(&mut self, index: usize) -> TreeResult<()> {
        let tree = self.trees.remove(index);
        if let Some(root_id) = tree.root_id() {
            decrement_cascading(&mut self.backend, root_id)?;
        }
        Ok(())
    }

    /// Run `f` against the tree at `index`, supplying the forest's shared
    /// backend and id allocator. This is the normal way to call
    /// [`BTree`] operations from application code, so the forest's id
    /// counter stays authoritative.
    pub fn with_tree<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut BTree, &mut B, &mut dyn FnMut() -> NodeId) -> TreeResult<R>,
    ) -> TreeResult<R> {
        let mut tree = self.trees[index].clone();
        let result = {
            let backend = &mut self.backend;
            let mut alloc = {
                let last_id = &mut self.last_id;
                move || {
                    *last_id += 1;
                    *last_id
                }
            };
            f(&mut tree, backend, &mut alloc)
        };
        self.trees[index] = tree;
        result
    }

    /// Flush every pending change: save refcounts, persist forest
    /// metadata, then commit the backend.
    pub fn commit(&mut self) -> TreeResult<()> {
        self.backend.set_metadata(META_FORMAT, KEY_FORMAT)?;
        self.backend.set_metadata(META_KEY_SIZE, &self.key_size.to_string())?;
        self.backend
            .set_metadata(META_NODE_SIZE, &self.backend.block_size().to_string())?;
        self.backend.set_metadata(META_LAST_ID, &self.last_id.to_string())?;
        let root_ids: Vec<String> = self
            .trees
            .iter()
            .filter_map(|t| t.root_id())
            .map(|id| id.to_string())
            .collect();
        self.backend.set_metadata(META_ROOT_IDS, &root_ids.join(","))?;
        self.backend.save_metadata()?;
        self.backend.save_refcounts()?;
        self.backend.commit()?;
        info!("committed forest: {} live trees, last_id={}", self.trees.len(), self.last_id);
        Ok(())
    }
}

/// Cascading decrement entry point shared by [`Forest::remove_tree`] and
/// [`open_forest`]'s error paths. Mirrors `BTree`'s internal decrement, but
/// a forest-level tree removal always starts from refcount-1 bookkeeping
/// rather than an in-flight edit, so it lives here rather than being
/// threaded through `BTree`.
fn decrement_cascading(backend: &mut dyn Backend, id: NodeId) -> TreeResult<()> {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let rc = backend.get_refcount(current)?;
        if rc == 0 {
            continue;
        }
        let new_rc = rc - 1;
        backend.set_refcount(current, new_rc)?;
        if new_rc == 0 {
            if let Node::Index(idx) = backend.get_node(current)? {
                stack.extend(idx.child_ids.iter().copied());
            }
            backend.remove_node(current)?;
        }
    }
    Ok(())
}

/// Open (or initialize) a forest.
///
/// If the backend has no stored metadata yet, `key_size`/`block_size` are
/// required and become the forest's configuration. Otherwise, the stored
/// `key_size` must match exactly (`BadKeySize`); a stored `block_size`
/// mismatch is tolerated and the stored value wins. The stored format tag
/// must equal this crate's tag (`FormatProblem`).
pub fn open_forest<B: Backend>(backend: B, key_size: usize) -> TreeResult<Forest<B>> {
    let mut backend = backend;

    let stored_format = backend.get_metadata(META_FORMAT)?;
    let stored_key_size = backend.get_metadata(META_KEY_SIZE)?;

    let (effective_key_size, last_id, root_ids) = match (stored_format, stored_key_size) {
        (Some(format), Some(key_size_str)) => {
            if format != KEY_FORMAT {
                return Err(TreeError::FormatProblem {
                    expected: KEY_FORMAT.to_string(),
                    found: format,
                });
            }
            let stored_key_size: usize = key_size_str
                .parse()
                .map_err(|_| TreeError::BadNodeSize {
                    reason: format!("stored key_size '{}' is not a valid integer", key_size_str),
                })?;
            if stored_key_size != key_size {
                return Err(TreeError::BadKeySize {
                    expected: stored_key_size,
                    requested: key_size,
                });
            }
            let last_id_str = backend
                .get_metadata(META_LAST_ID)?
                .ok_or_else(|| TreeError::MetadataMissingKey {
                    key: META_LAST_ID.to_string(),
                })?;
            let last_id: NodeId = last_id_str.parse().map_err(|_| TreeError::BadNodeSize {
                reason: format!("stored last_id '{}' is not a valid integer", last_id_str),
            })?;
            let root_ids_str = backend.get_metadata(META_ROOT_IDS)?.unwrap_or_default();
            let root_ids: Vec<NodeId> = if root_ids_str.is_empty() {
                Vec::new()
            } else {
                root_ids_str
                    .split(',')
                    .map(|s| {
                        s.parse().map_err(|_| TreeError::BadNodeSize {
                            reason: format!("stored root id '{}' is not a valid integer", s),
                        })
                    })
                    .collect::<TreeResult<Vec<NodeId>>>()?
            };
            (stored_key_size, last_id, root_ids)
        }
        _ => {
            debug!("initializing fresh forest with key_size={}", key_size);
            (key_size, 0, Vec::new())
        }
    };

    let trees = root_ids
        .into_iter()
        .map(|id| BTree::new(effective_key_size, Some(id)))
        .collect();

    Ok(Forest {
        backend,
        key_size: effective_key_size,
        last_id,
        trees,
    })
}
