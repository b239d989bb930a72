// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! orbtree - a persistent, copy-on-write B-tree storage engine.
//!
//! A forest of B-trees over fixed-size keys and variable-size values, where
//! cloning an entire tree is O(1) and editing a clone never disturbs the
//! tree it was cloned from. Subtrees are shared between clones until one of
//! them diverges; node reference counting decides, at every edit, whether a
//! node can be mutated in place or must first be shadowed (copied).
//!
//! ## Quick start
//!
//! ```rust
//! use orbtree::backend::memory::MemoryBackend;
//! use orbtree::forest::open_forest;
//!
//! let backend = MemoryBackend::new(4, 4096);
//! let mut forest = open_forest(backend, 4).unwrap();
//! let main = forest.new_tree(None).unwrap();
//!
//! forest
//!     .with_tree(main, |tree, backend, alloc| {
//!         tree.insert(backend, alloc, &1u32.to_be_bytes().to_vec(), b"hello")
//!     })
//!     .unwrap();
//!
//! // Cloning is O(1): nothing below the root is copied yet.
//! let clone = forest.new_tree(Some(main)).unwrap();
//! forest.commit().unwrap();
//! # let _ = clone;
//! ```
//!
//! ## Architecture
//!
//! - [`node`]: the `Leaf`/`Index` node shapes and their frozen/mutable
//!   state.
//! - [`codec`]: fixed-size block encoding, keyed off magic cookies
//!   `ORBL`/`ORBI`.
//! - [`refcount`]: the grouped, on-disk node refcount store.
//! - [`backend`]: the `Backend` trait, plus the shipped in-memory and
//!   disk-backed implementations (the disk backend layers an LRU cache, a
//!   write-back upload queue, and a crash-atomic journal over block files).
//! - [`tree`]: the copy-on-write B-tree algorithms: lookup, range query,
//!   insert, remove.
//! - [`forest`]: a set of trees sharing one backend, with O(1) cloning and
//!   id/refcount bookkeeping.
//! - [`fsck`]: an offline integrity checker over a forest's backend.

pub mod backend;
pub mod codec;
pub mod error;
pub mod forest;
pub mod fsck;
pub mod node;
pub mod refcount;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use forest::{open_forest, Forest};
pub use node::{Index, Leaf, Node, NodeId, NodeState};
pub use tree::BTree;
