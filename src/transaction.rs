//! Transaction-like index rebuilds with automatic rollback
//!
//! The existing index is moved aside before a rebuild and put back when the
//! rebuild does not commit.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::warn;

use crate::storage::IndexStorage;

/// Represents an index rebuild with automatic rollback on failure
pub struct RebuildTransaction<'a> {
    storage: &'a IndexStorage,
    backup_path: Option<PathBuf>,
}

impl<'a> RebuildTransaction<'a> {
    /// Create a new rebuild transaction
    pub fn new(storage: &'a IndexStorage) -> Self {
        Self {
            storage,
            backup_path: None,
        }
    }

    /// Begin the transaction by moving any existing index aside
    ///
    /// Afterwards the index directory is free for a fresh build.
    pub fn begin(&mut self) -> Result<()> {
        if self.storage.index_dir().exists() {
            let backup_path = self
                .storage
                .backup_index()
                .context("Failed to create backup")?;
            self.backup_path = Some(backup_path);
        }
        Ok(())
    }

    /// Commit the transaction by cleaning up the backup
    pub fn commit(mut self) -> Result<()> {
        if let Some(backup_path) = self.backup_path.take() {
            self.storage
                .cleanup_backup(&backup_path)
                .context("Failed to cleanup backup")?;
        }
        Ok(())
    }

    /// Rollback the transaction by restoring from backup
    ///
    /// Without a backup the partial index is removed, leaving no index.
    pub fn rollback(&mut self) -> Result<()> {
        match self.backup_path.take() {
            Some(backup_path) => self
                .storage
                .restore_index_from_backup(&backup_path)
                .context("Failed to restore from backup"),
            None => self
                .storage
                .remove_index()
                .context("Failed to remove partial index"),
        }
    }
}

impl<'a> Drop for RebuildTransaction<'a> {
    fn drop(&mut self) {
        // If transaction wasn't committed and there's a backup, try to rollback
        if self.backup_path.is_some() {
            if let Err(e) = self.rollback() {
                warn!("Rollback of index rebuild failed: {:#}", e);
            }
        }
    }
}
