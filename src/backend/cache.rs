// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A fixed-capacity LRU cache keyed by node id, with an eviction hook.
//!
//! When an entry is pushed out by capacity, `forget_hook` is invoked with
//! the evicted (id, value) pair before it is dropped. The disk backend uses
//! this to hand evicted nodes to its upload queue rather than losing them.

use std::collections::HashMap;

/// A node id's position in the LRU order: least-recently-used at the front.
pub struct LruCache<V> {
    capacity: usize,
    order: Vec<u64>,
    entries: HashMap<u64, V>,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        LruCache {
            capacity: capacity.max(1),
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, id: u64) {
        if let Some(pos) = self.order.iter().position(|&x| x == id) {
            self.order.remove(pos);
        }
        self.order.push(id);
    }

    pub fn get(&mut self, id: u64) -> Option<&V> {
        if self.entries.contains_key(&id) {
            self.touch(id);
            self.entries.get(&id)
        } else {
            None
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert or update an entry, evicting the least-recently-used entry
    /// via `forget_hook` if this insert would exceed capacity.
    pub fn put(&mut self, id: u64, value: V, mut forget_hook: impl FnMut(u64, V)) {
        if self.entries.contains_key(&id) {
            self.entries.insert(id, value);
            self.touch(id);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.first().copied() {
                self.order.remove(0);
                if let Some(evicted) = self.entries.remove(&oldest) {
                    forget_hook(oldest, evicted);
                }
            }
        }
        self.entries.insert(id, value);
        self.order.push(id);
    }

    pub fn remove(&mut self, id: u64) -> Option<V> {
        if let Some(pos) = self.order.iter().position(|&x| x == id) {
            self.order.remove(pos);
        }
        self.entries.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.order.iter().copied()
    }

    /// Evict every entry, invoking `forget_hook` for each in LRU order.
    pub fn drain(&mut self, mut forget_hook: impl FnMut(u64, V)) {
        let ids: Vec<u64> = self.order.drain(..).collect();
        for id in ids {
            if let Some(value) = self.entries.remove(&id) {
                forget_hook(id, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        let mut evicted = Vec::new();
        cache.put(1, "a", |id, v| evicted.push((id, v)));
        cache.put(2, "b", |id, v| evicted.push((id, v)));
        cache.get(1);
        cache.put(3, "c", |id, v| evicted.push((id, v)));
        assert_eq!(evicted, vec![(2, "b")]);
        assert!(cache.contains(1));
        assert!(cache.contains(3));
        assert!(!cache.contains(2));
    }

    #[test]
    fn drain_forgets_everything_in_order() {
        let mut cache = LruCache::new(4);
        cache.put(1, "a", |_, _| {});
        cache.put(2, "b", |_, _| {});
        let mut out = Vec::new();
        cache.drain(|id, v| out.push((id, v)));
        assert_eq!(out, vec![(1, "a"), (2, "b")]);
        assert!(cache.is_empty());
    }
}
