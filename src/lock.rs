//! File-based locking for single-writer safety of an index directory.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: the process that owns the index (GistIndex::open).
//! - Shared: read-only inspection (CLI status) that must not race a writer's checkpoint.
//!
//! Lock file path: <root>/LOCK
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(root: &Path) -> Result<(std::fs::File, PathBuf)> {
    let path = root.join(LOCK_FILE);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok((f, path))
}

/// Acquire a lock in the requested mode without blocking. Returns Err if another holder conflicts.
pub fn try_acquire_lock(root: &Path, mode: LockMode) -> Result<LockGuard> {
    let (file, path) = open_lock_file(root)?;
    match mode {
        LockMode::Shared => file
            .try_lock_shared()
            .with_context(|| format!("index is locked by a writer: {}", path.display()))?,
        LockMode::Exclusive => file
            .try_lock_exclusive()
            .with_context(|| format!("index is already open: {}", path.display()))?,
    }
    Ok(LockGuard { file, path, mode })
}
