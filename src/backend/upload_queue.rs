// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Write-back coalescing queue sitting between the tree and durable
//! storage.
//!
//! A node that is put and then shadowed away again within the same
//! operation never touches disk: it sits in this queue until evicted by
//! capacity or an explicit [`UploadQueue::flush`], at which point the
//! caller-supplied `really_put` callback performs the actual write.

use super::cache::LruCache;

pub struct UploadQueue<V> {
    cache: LruCache<V>,
}

impl<V> UploadQueue<V> {
    pub fn new(capacity: usize) -> Self {
        UploadQueue {
            cache: LruCache::new(capacity),
        }
    }

    /// Queue `value` for eventual write-back. If this push evicts an older
    /// entry, `really_put` is invoked with it immediately.
    pub fn put(&mut self, id: u64, value: V, really_put: impl FnMut(u64, V)) {
        self.cache.put(id, value, really_put);
    }

    pub fn get(&mut self, id: u64) -> Option<&V> {
        self.cache.get(id)
    }

    pub fn remove(&mut self, id: u64) -> Option<V> {
        self.cache.remove(id)
    }

    pub fn list_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.cache.ids()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Write back every queued entry, in LRU order.
    pub fn flush(&mut self, really_put: impl FnMut(u64, V)) {
        self.cache.drain(really_put);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_triggers_real_write() {
        let mut queue = UploadQueue::new(1);
        let mut written = Vec::new();
        queue.put(1, "a", |id, v| written.push((id, v)));
        queue.put(2, "b", |id, v| written.push((id, v)));
        assert_eq!(written, vec![(1, "a")]);
        assert!(queue.get(2).is_some());
    }

    #[test]
    fn flush_writes_back_everything() {
        let mut queue = UploadQueue::new(4);
        queue.put(1, "a", |_, _| {});
        queue.put(2, "b", |_, _| {});
        let mut written = Vec::new();
        queue.flush(|id, v| written.push((id, v)));
        assert_eq!(written, vec![(1, "a"), (2, "b")]);
        assert!(queue.is_empty());
    }
}
