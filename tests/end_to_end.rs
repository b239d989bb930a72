// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use orbtree::backend::disk::DiskBackend;
use orbtree::backend::memory::MemoryBackend;
use orbtree::forest::open_forest;
use orbtree::fsck;
use orbtree::TreeError;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tempfile::tempdir;

fn key3(s: &str) -> Vec<u8> {
    assert_eq!(s.len(), 3);
    s.as_bytes().to_vec()
}

#[test]
fn scenario_1_basic_roundtrip_across_commit_and_reopen() {
    let dir = tempdir().unwrap();

    {
        let backend = DiskBackend::open(dir.path(), 3, 64).unwrap();
        let mut forest = open_forest(backend, 3).unwrap();
        let t = forest.new_tree(None).unwrap();
        forest
            .with_tree(t, |tree, backend, alloc| {
                tree.insert(backend, alloc, &key3("foo"), b"bar")
            })
            .unwrap();
        let looked_up = forest.with_tree(t, |tree, backend, _| tree.lookup(backend, &key3("foo"))).unwrap();
        assert_eq!(looked_up, b"bar");
        forest.commit().unwrap();
    }

    let backend = DiskBackend::open(dir.path(), 3, 64).unwrap();
    let mut forest = open_forest(backend, 3).unwrap();
    assert_eq!(forest.trees().len(), 1);
    let value = forest.with_tree(0, |tree, backend, _| tree.lookup(backend, &key3("foo"))).unwrap();
    assert_eq!(value, b"bar");
}

#[test]
fn scenario_2_random_permutation_insert_stays_consistent() {
    let backend = MemoryBackend::new(3, 64);
    let mut forest = open_forest(backend, 3).unwrap();
    let t = forest.new_tree(None).unwrap();

    let mut keys: Vec<u32> = (0..100).collect();
    keys.shuffle(&mut thread_rng());

    for n in &keys {
        let k = format!("{:03}", n).into_bytes();
        let v = k.clone();
        forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &k, &v)).unwrap();
    }

    for n in 0..100u32 {
        let k = format!("{:03}", n).into_bytes();
        let v = forest.with_tree(t, |tree, backend, _| tree.lookup(backend, &k)).unwrap();
        assert_eq!(v, k);
    }
}

#[test]
fn scenario_3_random_permutation_remove_empties_the_tree() {
    let backend = MemoryBackend::new(3, 64);
    let mut forest = open_forest(backend, 3).unwrap();
    let t = forest.new_tree(None).unwrap();

    for n in 0..100u32 {
        let k = format!("{:03}", n).into_bytes();
        forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &k, &k)).unwrap();
    }

    let mut remove_order: Vec<u32> = (0..100).collect();
    remove_order.shuffle(&mut thread_rng());

    for n in &remove_order {
        let k = format!("{:03}", n).into_bytes();
        forest.with_tree(t, |tree, backend, alloc| tree.remove(backend, alloc, &k)).unwrap();
        let err = forest.with_tree(t, |tree, backend, _| tree.lookup(backend, &k));
        assert!(matches!(err, Err(TreeError::KeyMissing)));
    }

    let root_id = forest.tree(t).unwrap().root_id().unwrap();
    match forest.backend().get_node(root_id).unwrap() {
        orbtree::Node::Index(idx) => assert!(idx.is_empty()),
        orbtree::Node::Leaf(_) => panic!("root should always be an index node"),
    }
}

#[test]
fn scenario_4_range_queries() {
    let backend = MemoryBackend::new(3, 64);
    let mut forest = open_forest(backend, 3).unwrap();
    let t = forest.new_tree(None).unwrap();

    for k in ["002", "004", "006", "008"] {
        let key = key3(k);
        forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &key, &key)).unwrap();
    }

    let empty = forest
        .with_tree(t, |tree, backend, _| tree.range_is_empty(backend, &key3("000"), &key3("001")))
        .unwrap();
    assert!(empty);

    let not_empty = forest
        .with_tree(t, |tree, backend, _| tree.range_is_empty(backend, &key3("000"), &key3("002")))
        .unwrap();
    assert!(!not_empty);

    let narrow = forest
        .with_tree(t, |tree, backend, _| tree.lookup_range(backend, &key3("001"), &key3("003")))
        .unwrap();
    assert_eq!(narrow, vec![(key3("002"), key3("002"))]);

    let everything = forest
        .with_tree(t, |tree, backend, _| tree.lookup_range(backend, &key3("000"), &key3("999")))
        .unwrap();
    assert_eq!(
        everything,
        vec![
            (key3("002"), key3("002")),
            (key3("004"), key3("004")),
            (key3("006"), key3("006")),
            (key3("008"), key3("008")),
        ]
    );
}

#[test]
fn scenario_5_clone_isolation_survives_commit_and_reopen() {
    let dir = tempdir().unwrap();

    {
        let backend = DiskBackend::open(dir.path(), 3, 64).unwrap();
        let mut forest = open_forest(backend, 3).unwrap();
        let t1 = forest.new_tree(None).unwrap();
        forest.with_tree(t1, |tree, backend, alloc| tree.insert(backend, alloc, &key3("000"), b"foo")).unwrap();
        forest.with_tree(t1, |tree, backend, alloc| tree.insert(backend, alloc, &key3("001"), b"bar")).unwrap();

        let t2 = forest.new_tree(Some(t1)).unwrap();
        forest.with_tree(t2, |tree, backend, alloc| tree.insert(backend, alloc, &key3("002"), b"foobar")).unwrap();
        forest.with_tree(t2, |tree, backend, alloc| tree.remove(backend, alloc, &key3("000"))).unwrap();

        forest.commit().unwrap();
    }

    let backend = DiskBackend::open(dir.path(), 3, 64).unwrap();
    let mut forest = open_forest(backend, 3).unwrap();
    assert_eq!(forest.trees().len(), 2);

    assert_eq!(forest.with_tree(0, |tree, backend, _| tree.lookup(backend, &key3("000"))).unwrap(), b"foo");
    assert_eq!(forest.with_tree(0, |tree, backend, _| tree.lookup(backend, &key3("001"))).unwrap(), b"bar");
    assert!(matches!(
        forest.with_tree(1, |tree, backend, _| tree.lookup(backend, &key3("000"))),
        Err(TreeError::KeyMissing)
    ));
    assert_eq!(forest.with_tree(1, |tree, backend, _| tree.lookup(backend, &key3("001"))).unwrap(), b"bar");
    assert_eq!(forest.with_tree(1, |tree, backend, _| tree.lookup(backend, &key3("002"))).unwrap(), b"foobar");
}

#[test]
fn scenario_6_fsck_finds_and_fixes_a_missing_block() {
    let backend = MemoryBackend::new(3, 64);
    let mut forest = open_forest(backend, 3).unwrap();
    let t = forest.new_tree(None).unwrap();
    for n in 0..40u32 {
        let k = format!("{:03}", n).into_bytes();
        forest.with_tree(t, |tree, backend, alloc| tree.insert(backend, alloc, &k, &k)).unwrap();
    }

    let roots: Vec<_> = forest.trees().iter().filter_map(|t| t.root_id()).collect();
    let clean_report = fsck::check(forest.backend(), &roots, 3, false);
    assert!(clean_report.is_clean());

    let root_id = forest.tree(t).unwrap().root_id().unwrap();
    let victim = match forest.backend().get_node(root_id).unwrap() {
        orbtree::Node::Index(idx) => idx.child_ids[0],
        orbtree::Node::Leaf(_) => panic!("root should always be an index node"),
    };
    forest.backend().remove_node(victim).unwrap();

    let dirty_report = fsck::check(forest.backend(), &roots, 3, true);
    assert!(dirty_report
        .discrepancies
        .iter()
        .any(|d| matches!(d, fsck::Discrepancy::MissingNode { id } if *id == victim)));

    let repaired_index = match forest.backend().get_node(root_id).unwrap() {
        orbtree::Node::Index(idx) => idx,
        orbtree::Node::Leaf(_) => panic!("root should always be an index node"),
    };
    assert!(!repaired_index.child_ids.contains(&victim), "fix mode should drop the dangling edge");

    let repaired_report = fsck::check(forest.backend(), &roots, 3, false);
    assert!(repaired_report.is_clean(), "edge drop should leave the forest clean: {:?}", repaired_report.discrepancies);
}
