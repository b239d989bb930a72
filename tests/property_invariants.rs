// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use orbtree::backend::memory::MemoryBackend;
use orbtree::forest::open_forest;
use orbtree::{Node, TreeError};
use proptest::collection::vec as pvec;
use proptest::prelude::*;

const KEY_SIZE: usize = 4;
const BLOCK_SIZE: usize = 128;

fn key_of(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

/// Walk every reachable node from `root`, asserting: sorted/unique keys,
/// encoded size within budget, and all leaves at the same depth. Returns
/// the set of reachable ids with each id's computed incoming-edge count.
fn check_shape_and_collect_reachable(
    backend: &mut MemoryBackend,
    root: u64,
    codec: &orbtree::codec::Codec,
) -> std::collections::HashMap<u64, u16> {
    let mut reachable: std::collections::HashMap<u64, u16> = std::collections::HashMap::new();
    *reachable.entry(root).or_insert(0) += 1;

    let mut leaf_depths: Vec<usize> = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let node = backend.get_node(id).expect("reachable node must exist");
        match &node {
            Node::Leaf(l) => {
                assert!(l.keys.windows(2).all(|w| w[0] < w[1]), "leaf {} keys not strictly sorted", id);
                let size = codec.leaf_size(&l.values);
                assert!(size <= BLOCK_SIZE, "leaf {} encodes to {} > {}", id, size, BLOCK_SIZE);
                leaf_depths.push(depth);
            }
            Node::Index(idx) => {
                assert!(idx.keys.windows(2).all(|w| w[0] < w[1]), "index {} keys not strictly sorted", id);
                let size = codec.index_size(idx.keys.len());
                assert!(size <= BLOCK_SIZE, "index {} encodes to {} > {}", id, size, BLOCK_SIZE);
                for &child in &idx.child_ids {
                    *reachable.entry(child).or_insert(0) += 1;
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    if !leaf_depths.is_empty() {
        let first = leaf_depths[0];
        assert!(leaf_depths.iter().all(|&d| d == first), "leaves at mismatched depths: {:?}", leaf_depths);
    }

    reachable
}

fn assert_refcounts_match_edges(backend: &mut MemoryBackend, reachable: &std::collections::HashMap<u64, u16>) {
    for (&id, &computed) in reachable {
        let stored = backend.get_refcount(id).expect("refcount lookup");
        assert_eq!(stored, computed, "refcount mismatch for node {}", id);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn insert_sequence_preserves_shape_and_refcount_invariants(
        keys in pvec(0u32..500, 1..60)
    ) {
        let backend = MemoryBackend::new(KEY_SIZE, BLOCK_SIZE);
        let mut forest = open_forest(backend, KEY_SIZE).unwrap();
        let t = forest.new_tree(None).unwrap();
        let codec = orbtree::codec::Codec::new(KEY_SIZE, BLOCK_SIZE);

        for &n in &keys {
            let k = key_of(n);
            forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &k, &k)).unwrap();

            let root = forest.tree(t).unwrap().root_id().unwrap();
            let reachable = check_shape_and_collect_reachable(forest.backend(), root, &codec);
            assert_refcounts_match_edges(forest.backend(), &reachable);

            let looked_up = forest.with_tree(t, |tree, backend, _| tree.lookup(backend, &k)).unwrap();
            prop_assert_eq!(looked_up, k);
        }
    }

    #[test]
    fn insert_then_remove_interleaving_matches_last_write(
        ops in pvec((0u32..40, any::<bool>()), 1..80)
    ) {
        let backend = MemoryBackend::new(KEY_SIZE, BLOCK_SIZE);
        let mut forest = open_forest(backend, KEY_SIZE).unwrap();
        let t = forest.new_tree(None).unwrap();
        let mut model: std::collections::HashMap<u32, Vec<u8>> = std::collections::HashMap::new();

        for (n, do_insert) in ops {
            let k = key_of(n);
            if do_insert {
                let v = vec![(n % 256) as u8];
                forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &k, &v)).unwrap();
                model.insert(n, v);
            } else {
                let result = forest.with_tree(t, |tree, backend, alloc| tree.remove(backend, alloc, &k));
                if model.remove(&n).is_some() {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(matches!(result, Err(TreeError::KeyMissing)));
                }
            }
        }

        for (n, expected) in &model {
            let k = key_of(*n);
            let got = forest.with_tree(t, |tree, backend, _| tree.lookup(backend, &k)).unwrap();
            prop_assert_eq!(&got, expected);
        }
    }
}
