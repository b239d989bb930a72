// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Minimal, non-interactive walkthrough of a forest: open, insert, clone,
//! commit, reopen. Run with `cargo run --example forest_walkthrough`.

use orbtree::backend::disk::DiskBackend;
use orbtree::forest::open_forest;

fn main() {
    env_logger::init();

    let dir = std::env::temp_dir().join("orbtree-demo");
    std::fs::create_dir_all(&dir).expect("create demo directory");

    {
        let backend = DiskBackend::open(&dir, 4, 4096).expect("open disk backend");
        let mut forest = open_forest(backend, 4).expect("open forest");

        let main = forest.new_tree(None).expect("create tree");
        for n in 0..10u32 {
            let key = n.to_be_bytes().to_vec();
            let value = format!("value-{n}").into_bytes();
            forest
                .with_tree(main, |tree, backend, alloc| tree.insert(backend, alloc, &key, &value))
                .expect("insert");
        }

        let clone = forest.new_tree(Some(main)).expect("clone tree");
        forest
            .with_tree(clone, |tree, backend, alloc| {
                tree.remove(backend, alloc, &5u32.to_be_bytes())
            })
            .expect("remove from clone");

        println!("main tree still has key 5: {}", forest.with_tree(main, |tree, backend, _| tree.lookup(backend, &5u32.to_be_bytes())).is_ok());
        println!("clone no longer has key 5: {}", forest.with_tree(clone, |tree, backend, _| tree.lookup(backend, &5u32.to_be_bytes())).is_err());

        forest.commit().expect("commit");
    }

    let backend = DiskBackend::open(&dir, 4, 4096).expect("reopen disk backend");
    let forest = open_forest(backend, 4).expect("reopen forest");
    println!("reopened forest with {} live trees", forest.trees().len());

    std::fs::remove_dir_all(&dir).ok();
}
