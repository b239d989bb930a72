// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Offline integrity checker.
//!
//! Walks every tree in a forest from its root, validating node shape,
//! key ordering, and refcounts against what the tree structure itself
//! implies. Every discrepancy is collected into a [`FsckReport`] rather
//! than stopping at the first one, so a single run surfaces the whole
//! picture.

use crate::backend::Backend;
use crate::node::{Node, NodeId};
use std::collections::HashMap;
use std::fmt;

/// A single integrity discrepancy found during a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// A node referenced by a parent edge or forest root has no block.
    MissingNode { id: NodeId },
    /// A block failed to decode (bad cookie, truncated, or similar).
    CorruptNode { id: NodeId, reason: String },
    /// A leaf or index's keys were not strictly ascending, or contained an
    /// empty key.
    UnsortedKeys { id: NodeId },
    /// A key fell outside the `[minkey, maxkey)` window implied by its
    /// parent's edges.
    KeyOutOfWindow { id: NodeId, key: Vec<u8> },
    /// A node's encoded size exceeded the backend's block size.
    OversizedNode { id: NodeId, size: usize, max: usize },
    /// A tree's root had a refcount other than 1.
    BadRootRefcount { id: NodeId, actual: u16 },
    /// The refcount recomputed from parent edges didn't match what was
    /// stored.
    RefcountMismatch { id: NodeId, stored: u16, computed: u16 },
    /// A node block exists but is unreachable from any tree root.
    OrphanNode { id: NodeId },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode { id } => write!(f, "node {} is missing", id),
            Self::CorruptNode { id, reason } => write!(f, "node {} failed to decode: {}", id, reason),
            Self::UnsortedKeys { id } => write!(f, "node {} has unsorted, duplicate, or empty keys", id),
            Self::KeyOutOfWindow { id, key } => {
                write!(f, "node {} has a key {:?} outside its parent's window", id, key)
            }
            Self::OversizedNode { id, size, max } => {
                write!(f, "node {} encodes to {} bytes, exceeding block size {}", id, size, max)
            }
            Self::BadRootRefcount { id, actual } => {
                write!(f, "root {} has refcount {}, expected 1", id, actual)
            }
            Self::RefcountMismatch { id, stored, computed } => write!(
                f,
                "node {} has stored refcount {} but {} incoming edges",
                id, stored, computed
            ),
            Self::OrphanNode { id } => write!(f, "node {} is stored but unreachable from any root", id),
        }
    }
}

/// Result of a full forest scan.
#[derive(Debug, Clone, Default)]
pub struct FsckReport {
    pub discrepancies: Vec<Discrepancy>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Walk every tree rooted at `roots`, checking structural invariants and
/// recomputing refcounts. If `fix` is set, edges pointing at a missing
/// child are dropped from their parent index and the repaired parent is
/// persisted, and refcounts recomputed from the corrected edge set are
/// written back.
pub fn check<B: Backend>(backend: &mut B, roots: &[NodeId], key_size: usize, fix: bool) -> FsckReport {
    let mut report = FsckReport::default();
    let mut computed_refcounts: HashMap<NodeId, u16> = HashMap::new();
    let mut visited: std::collections::HashSet<NodeId> = std::collections::HashSet::new();

    for &root_id in roots {
        *computed_refcounts.entry(root_id).or_insert(0) += 1;
        walk(backend, root_id, key_size, &mut vec![], &mut vec![], &mut computed_refcounts, &mut visited, &mut report, fix);

        match backend.get_refcount(root_id) {
            Ok(actual) if actual != 1 => {
                report.discrepancies.push(Discrepancy::BadRootRefcount { id: root_id, actual });
            }
            Ok(_) => {}
            Err(_) => {} // already reported as MissingNode by walk()
        }
    }

    for (&id, &computed) in &computed_refcounts {
        match backend.get_refcount(id) {
            Ok(stored) if stored != computed => {
                report.discrepancies.push(Discrepancy::RefcountMismatch { id, stored, computed });
                if fix {
                    let _ = backend.set_refcount(id, computed);
                }
            }
            _ => {}
        }
    }

    if let Ok(all_ids) = backend.list_nodes() {
        for id in all_ids {
            if !visited.contains(&id) {
                report.discrepancies.push(Discrepancy::OrphanNode { id });
            }
        }
    }

    report
}

fn walk<B: Backend>(
    backend: &mut B,
    id: NodeId,
    key_size: usize,
    min_key: &mut Vec<u8>,
    max_key: &mut Vec<u8>,
    computed_refcounts: &mut HashMap<NodeId, u16>,
    visited: &mut std::collections::HashSet<NodeId>,
    report: &mut FsckReport,
    fix: bool,
) {
    if !visited.insert(id) {
        return;
    }

    let node = match backend.get_node(id) {
        Ok(n) => n,
        Err(_) => {
            report.discrepancies.push(Discrepancy::MissingNode { id });
            return;
        }
    };

    let keys: &[Vec<u8>] = match &node {
        Node::Leaf(l) => &l.keys,
        Node::Index(i) => &i.keys,
    };
    if !is_sorted_unique_nonempty(keys, key_size) {
        report.discrepancies.push(Discrepancy::UnsortedKeys { id });
    }
    for key in keys {
        if !min_key.is_empty() && key.as_slice() < min_key.as_slice() {
            report.discrepancies.push(Discrepancy::KeyOutOfWindow { id, key: key.clone() });
        }
        if !max_key.is_empty() && key.as_slice() >= max_key.as_slice() {
            report.discrepancies.push(Discrepancy::KeyOutOfWindow { id, key: key.clone() });
        }
    }

    match node {
        Node::Leaf(_) => {}
        Node::Index(idx) => {
            let mut dangling: Vec<usize> = Vec::new();

            for i in 0..idx.child_ids.len() {
                let child_id = idx.child_ids[i];

                if backend.get_node(child_id).is_err() {
                    report.discrepancies.push(Discrepancy::MissingNode { id: child_id });
                    if fix {
                        dangling.push(i);
                    }
                    continue;
                }

                *computed_refcounts.entry(child_id).or_insert(0) += 1;

                let mut child_min = idx.keys[i].clone();
                let mut child_max = idx.keys.get(i + 1).cloned().unwrap_or_default();
                std::mem::swap(&mut child_min, min_key);
                std::mem::swap(&mut child_max, max_key);

                walk(backend, child_id, key_size, min_key, max_key, computed_refcounts, visited, report, fix);

                std::mem::swap(&mut child_min, min_key);
                std::mem::swap(&mut child_max, max_key);
            }

            if fix && !dangling.is_empty() {
                let mut repaired = idx;
                for &i in dangling.iter().rev() {
                    repaired.keys.remove(i);
                    repaired.child_ids.remove(i);
                }
                let _ = backend.put_node(Node::Index(repaired));
            }
        }
    }
}

fn is_sorted_unique_nonempty(keys: &[Vec<u8>], key_size: usize) -> bool {
    for key in keys {
        if key.is_empty() || key.len() != key_size {
            return false;
        }
    }
    keys.windows(2).all(|w| w[0] < w[1])
}
