// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Crash-atomic commit for the disk backend.
//!
//! Writes are staged under `new/<relative path>`; deletions are staged by
//! moving the live file to `delete/<relative path>`. [`Journal::commit`]
//! makes every staged change durable via a sequence of renames that ends
//! with a single pivotal rename — `new/metadata` onto `metadata` — so a
//! crash either lands before that rename (next open rolls back) or after it
//! (next open replays forward). Nothing in between is ever observed as a
//! partial commit.

use crate::error::{TreeError, TreeResult};
use std::fs;
use std::path::{Path, PathBuf};

const NEW_DIR: &str = "new";
const DELETE_DIR: &str = "delete";
const METADATA_FILE: &str = "metadata";

pub struct Journal {
    root: PathBuf,
}

impl Journal {
    pub fn new(root: impl Into<PathBuf>) -> TreeResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(NEW_DIR)).map_err(io_err("create new dir"))?;
        fs::create_dir_all(root.join(DELETE_DIR)).map_err(io_err("create delete dir"))?;
        Ok(Journal { root })
    }

    fn new_path(&self, rel: &Path) -> PathBuf {
        self.root.join(NEW_DIR).join(rel)
    }

    fn delete_path(&self, rel: &Path) -> PathBuf {
        self.root.join(DELETE_DIR).join(rel)
    }

    fn live_path(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// Absolute path of `rel` were it currently staged under `new/`.
    pub fn staged_path(&self, rel: &Path) -> PathBuf {
        self.new_path(rel)
    }

    /// Whether a write for `rel` is currently staged (not yet committed).
    pub fn stage_write_path_exists(&self, rel: &Path) -> bool {
        self.new_path(rel).exists()
    }

    /// Discard a staged write for `rel` without committing or rolling back
    /// anything else — used when a node is created and removed again
    /// before ever being committed.
    pub fn discard_staged_write(&self, rel: &Path) -> TreeResult<()> {
        let path = self.new_path(rel);
        if path.exists() {
            fs::remove_file(&path).map_err(io_err("discard staged write"))?;
        }
        Ok(())
    }

    /// Stage a write of `data` to `rel` (relative to the backend root).
    /// The write itself is atomic (temp file + rename within `new/`), but
    /// the file is not visible at its final path until [`Self::commit`].
    pub fn stage_write(&self, rel: &Path, data: &[u8]) -> TreeResult<()> {
        let target = self.new_path(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err("create staging dir"))?;
        }
        write_via_temp(&target, data)
    }

    /// Stage deletion of the live file at `rel`, if it exists, by moving it
    /// into `delete/`, preserving its bytes for rollback.
    pub fn stage_delete(&self, rel: &Path) -> TreeResult<()> {
        let live = self.live_path(rel);
        if !live.exists() {
            return Ok(());
        }
        let dest = self.delete_path(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err("create delete staging dir"))?;
        }
        fs::rename(&live, &dest).map_err(io_err("stage delete"))
    }

    /// Whether a metadata commit is pending replay (process died between
    /// staging and the final pivot rename completing).
    pub fn metadata_is_pending(&self) -> bool {
        self.new_path(Path::new(METADATA_FILE)).exists()
    }

    /// Commit every staged write and delete. Drops staged deletes first
    /// (their originals are already out of the live tree), promotes every
    /// staged write except metadata, then performs the pivotal metadata
    /// rename last.
    pub fn commit(&self) -> TreeResult<()> {
        for path in walk_files(&self.root.join(DELETE_DIR))? {
            fs::remove_file(&path).map_err(io_err("drop staged delete"))?;
        }

        for path in walk_files(&self.root.join(NEW_DIR))? {
            let rel = path
                .strip_prefix(self.root.join(NEW_DIR))
                .expect("walked path under new dir");
            if rel == Path::new(METADATA_FILE) {
                continue;
            }
            let live = self.live_path(rel);
            if let Some(parent) = live.parent() {
                fs::create_dir_all(parent).map_err(io_err("create live dir"))?;
            }
            fs::rename(&path, &live).map_err(io_err("promote staged write"))?;
        }

        let staged_metadata = self.new_path(Path::new(METADATA_FILE));
        if staged_metadata.exists() {
            fs::rename(&staged_metadata, self.live_path(Path::new(METADATA_FILE)))
                .map_err(io_err("commit metadata"))?;
        }

        Ok(())
    }

    /// Undo all staged changes: remove everything under `new/`, and move
    /// everything under `delete/` back to its live path.
    pub fn rollback(&self) -> TreeResult<()> {
        for path in walk_files(&self.root.join(NEW_DIR))? {
            fs::remove_file(&path).map_err(io_err("discard staged write"))?;
        }

        for path in walk_files(&self.root.join(DELETE_DIR))? {
            let rel = path
                .strip_prefix(self.root.join(DELETE_DIR))
                .expect("walked path under delete dir");
            let live = self.live_path(rel);
            if let Some(parent) = live.parent() {
                fs::create_dir_all(parent).map_err(io_err("restore live dir"))?;
            }
            fs::rename(&path, &live).map_err(io_err("restore staged delete"))?;
        }

        Ok(())
    }

    /// Recover from a prior crash: replay forward if the metadata pivot was
    /// staged, otherwise roll back.
    pub fn recover(&self) -> TreeResult<()> {
        if self.metadata_is_pending() {
            self.commit()
        } else {
            self.rollback()
        }
    }
}

fn walk_files(dir: &Path) -> TreeResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).map_err(io_err("read staging dir"))? {
            let entry = entry.map_err(io_err("read staging dir entry"))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}

fn write_via_temp(target: &Path, data: &[u8]) -> TreeResult<()> {
    let tmp = target.with_extension("tmp");
    fs::write(&tmp, data).map_err(io_err("write temp file"))?;
    fs::rename(&tmp, target).map_err(io_err("rename temp file"))
}

fn io_err(operation: &'static str) -> impl Fn(std::io::Error) -> TreeError {
    move |e| TreeError::Io {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_promotes_staged_writes() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.stage_write(Path::new("nodes/0.blk"), b"hello").unwrap();
        journal.stage_write(Path::new(METADATA_FILE), b"meta").unwrap();
        journal.commit().unwrap();
        assert_eq!(fs::read(dir.path().join("nodes/0.blk")).unwrap(), b"hello");
        assert_eq!(fs::read(dir.path().join(METADATA_FILE)).unwrap(), b"meta");
        assert!(!journal.metadata_is_pending());
    }

    #[test]
    fn rollback_restores_deleted_file_and_drops_new() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("nodes_0.blk"), b"original").unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.stage_delete(Path::new("nodes_0.blk")).unwrap();
        journal.stage_write(Path::new("nodes_1.blk"), b"new").unwrap();
        journal.rollback().unwrap();
        assert_eq!(fs::read(dir.path().join("nodes_0.blk")).unwrap(), b"original");
        assert!(!dir.path().join("nodes_1.blk").exists());
    }

    #[test]
    fn recover_replays_when_metadata_staged() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.stage_write(Path::new(METADATA_FILE), b"meta").unwrap();
        journal.recover().unwrap();
        assert_eq!(fs::read(dir.path().join(METADATA_FILE)).unwrap(), b"meta");
    }

    #[test]
    fn recover_rolls_back_when_metadata_not_staged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"live").unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.stage_delete(Path::new("a")).unwrap();
        journal.recover().unwrap();
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"live");
    }
}
