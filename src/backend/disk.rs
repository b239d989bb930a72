// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Local-filesystem [`Backend`]: one file per node block under a balanced
//! directory hierarchy, refcounts in grouped binary files, metadata in a
//! small TOML document, all staged through a [`Journal`] so a crash never
//! leaves a partially-applied commit visible.

use super::cache::LruCache;
use super::idpath::id_path;
use super::journal::Journal;
use super::upload_queue::UploadQueue;
use super::Backend;
use crate::codec::Codec;
use crate::error::{TreeError, TreeResult};
use crate::node::{Node, NodeId};
use crate::refcount::{RefcountStore, GROUP_SIZE};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Tag written to forest metadata identifying the codec version this crate
/// produces. Bumped whenever the block layout changes incompatibly.
pub const FORMAT_TAG: &str = "orb/1";

const NODES_DIR: &str = "nodes";
const REFCOUNTS_DIR: &str = "refcounts";
const METADATA_FILE: &str = "metadata";

const DEFAULT_CACHE_SIZE: usize = 256;
const DEFAULT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataDoc {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

pub struct DiskBackend {
    root: PathBuf,
    journal: Journal,
    codec: Codec,
    metadata: BTreeMap<String, String>,
    metadata_dirty: bool,
    refcounts: RefcountStore,
    cache: LruCache<Node>,
    upload_queue: UploadQueue<Node>,
    pending_deletes: HashSet<NodeId>,
}

impl DiskBackend {
    /// Open (or create) a disk-backed store rooted at `root`, recovering
    /// from any interrupted prior commit first. `key_size`/`block_size` are
    /// used only when no metadata exists yet; a forest that has already
    /// been written to disk keeps its original sizes regardless of what is
    /// passed here (the caller, [`crate::forest::open_forest`], is
    /// responsible for deciding whether that is acceptable).
    pub fn open(root: impl Into<PathBuf>, key_size: usize, block_size: usize) -> TreeResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let journal = Journal::new(&root)?;
        journal.recover()?;

        let metadata = load_metadata(&root)?;

        let (effective_key_size, effective_block_size) = match (
            metadata.get("key_size"),
            metadata.get("node_size"),
        ) {
            (Some(k), Some(b)) => (
                k.parse().map_err(|_| TreeError::BadNodeSize {
                    reason: "stored key_size is not a number".to_string(),
                })?,
                b.parse().map_err(|_| TreeError::BadNodeSize {
                    reason: "stored node_size is not a number".to_string(),
                })?,
            ),
            _ => (key_size, block_size),
        };

        if let Some(format) = metadata.get("format") {
            if format != FORMAT_TAG {
                return Err(TreeError::FormatProblem {
                    expected: FORMAT_TAG.to_string(),
                    found: format.clone(),
                });
            }
        }

        debug!(
            "opened disk backend at {:?} (key_size={}, block_size={})",
            root, effective_key_size, effective_block_size
        );

        Ok(DiskBackend {
            root,
            journal,
            codec: Codec::new(effective_key_size, effective_block_size),
            metadata,
            metadata_dirty: false,
            refcounts: RefcountStore::new(),
            cache: LruCache::new(DEFAULT_CACHE_SIZE),
            upload_queue: UploadQueue::new(DEFAULT_QUEUE_SIZE),
            pending_deletes: HashSet::new(),
        })
    }

    pub fn key_size(&self) -> usize {
        self.codec.key_size()
    }

    fn node_rel_path(&self, id: NodeId) -> PathBuf {
        let p = id_path(id);
        let mut path = PathBuf::from(NODES_DIR);
        for component in &p.components {
            path.push(component);
        }
        path.push(format!("{}.blk", p.file_name));
        path
    }

    fn refcount_group_rel_path(start: u64) -> PathBuf {
        PathBuf::from(REFCOUNTS_DIR).join(format!("refcounts-{}", start))
    }

    fn really_put(&self, id: NodeId, node: Node) {
        let rel = self.node_rel_path(id);
        match self.codec.encode(&node) {
            Ok(bytes) => {
                if let Err(e) = self.journal.stage_write(&rel, &bytes) {
                    warn!("failed to stage node {} write: {}", id, e);
                }
            }
            Err(e) => warn!("failed to encode node {} on write-back: {}", id, e),
        }
    }

    fn ensure_refcount_group_loaded(&mut self, id: NodeId) -> TreeResult<()> {
        let start = RefcountStore::group_start(id);
        let group = start / GROUP_SIZE;
        if self.refcounts.is_group_loaded(group) {
            return Ok(());
        }
        let rel = Self::refcount_group_rel_path(start);
        let path = self.root.join(&rel);
        if path.exists() {
            let bytes = std::fs::read(&path)?;
            self.refcounts.load_group_from_bytes(&bytes)?;
        } else {
            self.refcounts.mark_group_loaded(group);
        }
        Ok(())
    }
}

impl Backend for DiskBackend {
    fn block_size(&self) -> usize {
        self.codec.block_size()
    }

    fn max_value_size(&self) -> usize {
        self.codec.max_value_size()
    }

    fn get_node(&mut self, id: NodeId) -> TreeResult<Node> {
        if self.pending_deletes.contains(&id) {
            return Err(TreeError::NodeMissing { id });
        }
        if let Some(node) = self.upload_queue.get(id) {
            return Ok(node.clone());
        }
        if let Some(node) = self.cache.get(id) {
            return Ok(node.clone());
        }

        let rel = self.node_rel_path(id);
        let staged = self.journal.stage_write_path_exists(&rel);
        let path = if staged {
            self.journal.staged_path(&rel)
        } else {
            self.root.join(&rel)
        };
        let bytes = std::fs::read(&path).map_err(|_| TreeError::NodeMissing { id })?;
        let node = self.codec.decode(&bytes)?;
        trace!("loaded node {} from disk", id);
        self.cache.put(id, node.clone(), |_, _| {});
        Ok(node)
    }

    fn put_node(&mut self, mut node: Node) -> TreeResult<()> {
        node.set_state(crate::node::NodeState::Frozen);
        let id = node.id();
        self.pending_deletes.remove(&id);
        self.cache.put(id, node.clone(), |_, _| {});
        let mut to_write: Option<(NodeId, Node)> = None;
        self.upload_queue.put(id, node, |evict_id, evicted| {
            to_write = Some((evict_id, evicted));
        });
        if let Some((evict_id, evicted)) = to_write {
            self.really_put(evict_id, evicted);
        }
        Ok(())
    }

    fn remove_node(&mut self, id: NodeId) -> TreeResult<()> {
        let existed_in_memory = self.cache.remove(id).is_some() | self.upload_queue.remove(id).is_some();
        let rel = self.node_rel_path(id);
        let existed_live = self.root.join(&rel).exists();
        let existed_staged = self.journal.stage_write_path_exists(&rel);
        if !existed_live && !existed_staged && !existed_in_memory {
            return Err(TreeError::NodeMissing { id });
        }
        if existed_staged {
            self.journal.discard_staged_write(&rel)?;
        }
        if existed_live {
            self.journal.stage_delete(&rel)?;
        }
        self.pending_deletes.insert(id);
        Ok(())
    }

    fn list_nodes(&mut self) -> TreeResult<Vec<NodeId>> {
        let mut ids: HashSet<NodeId> = HashSet::new();
        for id in self.upload_queue.list_ids() {
            ids.insert(id);
        }
        for id in self.cache.ids() {
            ids.insert(id);
        }
        let nodes_root = self.root.join(NODES_DIR);
        collect_node_ids(&nodes_root, &mut ids);
        let staged_nodes_root = self.journal.staged_path(Path::new(NODES_DIR));
        collect_node_ids(&staged_nodes_root, &mut ids);
        for id in &self.pending_deletes {
            ids.remove(id);
        }
        Ok(ids.into_iter().collect())
    }

    fn can_be_modified(&mut self, id: NodeId) -> TreeResult<bool> {
        Ok(self.get_refcount(id)? == 1)
    }

    fn get_refcount(&mut self, id: NodeId) -> TreeResult<u16> {
        self.ensure_refcount_group_loaded(id)?;
        Ok(self.refcounts.get(id))
    }

    fn set_refcount(&mut self, id: NodeId, count: u16) -> TreeResult<()> {
        self.ensure_refcount_group_loaded(id)?;
        self.refcounts.set(id, count);
        Ok(())
    }

    fn save_refcounts(&mut self) -> TreeResult<()> {
        let groups = self.refcounts.dirty_groups();
        for group in groups {
            let start = group * GROUP_SIZE;
            let bytes = self.refcounts.encode_group(start);
            let rel = Self::refcount_group_rel_path(start);
            self.journal.stage_write(&rel, &bytes)?;
        }
        self.refcounts.clear_dirty();
        Ok(())
    }

    fn get_metadata(&mut self, key: &str) -> TreeResult<Option<String>> {
        Ok(self.metadata.get(key).cloned())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> TreeResult<()> {
        self.metadata.insert(key.to_string(), value.to_string());
        self.metadata_dirty = true;
        Ok(())
    }

    fn remove_metadata(&mut self, key: &str) -> TreeResult<()> {
        self.metadata.remove(key);
        self.metadata_dirty = true;
        Ok(())
    }

    fn metadata_keys(&mut self) -> TreeResult<Vec<String>> {
        Ok(self.metadata.keys().cloned().collect())
    }

    fn save_metadata(&mut self) -> TreeResult<()> {
        if !self.metadata.contains_key("format") {
            self.metadata.insert("format".to_string(), FORMAT_TAG.to_string());
        }
        let doc = MetadataDoc {
            metadata: self.metadata.clone(),
        };
        let text = toml::to_string(&doc).map_err(|e| TreeError::Io {
            operation: "serialize metadata".to_string(),
            reason: e.to_string(),
        })?;
        self.journal.stage_write(Path::new(METADATA_FILE), text.as_bytes())?;
        self.metadata_dirty = false;
        Ok(())
    }

    fn commit(&mut self) -> TreeResult<()> {
        let mut pending = Vec::new();
        self.upload_queue.flush(|id, node| pending.push((id, node)));
        for (id, node) in pending {
            self.really_put(id, node);
        }
        if self.metadata_dirty {
            self.save_metadata()?;
        }
        self.save_refcounts()?;
        self.journal.commit()?;
        self.pending_deletes.clear();
        debug!("committed disk backend at {:?}", self.root);
        Ok(())
    }
}

fn collect_node_ids(dir: &Path, out: &mut HashSet<NodeId>) {
    if !dir.exists() {
        return;
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = u64::from_str_radix(stem, 16) {
                    out.insert(id);
                }
            }
        }
    }
}

fn load_metadata(root: &Path) -> TreeResult<BTreeMap<String, String>> {
    let path = root.join(METADATA_FILE);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let doc: MetadataDoc = toml::from_str(&text).map_err(|e| TreeError::Io {
        operation: "parse metadata".to_string(),
        reason: e.to_string(),
    })?;
    Ok(doc.metadata)
}
