use anyhow::{Context, Result, bail};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::search::indexer::IndexReport;

/// Manages the file system layout around a search index directory
///
/// For an index at `<dir>/index` the lock file is `<dir>/index.lock` and the
/// build metadata is `<dir>/index_metadata.json`.
#[derive(Debug, Clone)]
pub struct IndexStorage {
    index_dir: PathBuf,
}

/// Metadata about the last successful index build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub built_at: chrono::DateTime<chrono::Utc>,
    pub records_dir: String,
    pub files: usize,
    #[serde(default)]
    pub files_failed: Vec<String>,
    pub documents: usize,
    pub skipped: usize,
    pub size_bytes: u64,
}

impl IndexStorage {
    /// Create a new storage instance for the index at `index_dir`
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Whether the directory holds an index
    pub fn exists(&self) -> bool {
        Self::exists_in(&self.index_dir)
    }

    /// Whether `path` holds an index
    pub fn exists_in(path: &Path) -> bool {
        path.join("meta.json").is_file()
    }

    /// Get a sibling path of the index directory, named `<index dir name><suffix>`
    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let name = self
            .index_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        let parent = self.index_dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{name}{suffix}"))
    }

    /// Get the path of the rebuild lock file
    pub fn lock_path(&self) -> PathBuf {
        self.sibling_path(".lock")
    }

    /// Get the path of the build metadata file
    pub fn metadata_path(&self) -> PathBuf {
        self.sibling_path("_metadata.json")
    }

    /// Ensure a directory exists
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        Ok(())
    }

    /// Calculate the size of the index directory in bytes
    pub fn calculate_dir_size(&self) -> Result<u64> {
        dir_size(&self.index_dir)
    }

    /// Take the exclusive rebuild lock, blocking until other holders release it
    ///
    /// The lock is released when the returned file is dropped.
    pub fn lock_exclusive(&self) -> Result<File> {
        let file = self.open_lock_file()?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", self.lock_path().display()))?;
        Ok(file)
    }

    /// Take a shared lock, blocking while a rebuild holds the exclusive one
    pub fn lock_shared(&self) -> Result<File> {
        let file = self.open_lock_file()?;
        FileExt::lock_shared(&file)
            .with_context(|| format!("Failed to lock {}", self.lock_path().display()))?;
        Ok(file)
    }

    fn open_lock_file(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            self.ensure_dir(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))
    }

    /// Save build metadata after a successful build
    pub fn save_metadata(&self, records_dir: &Path, report: &IndexReport) -> Result<IndexMetadata> {
        let metadata = IndexMetadata {
            built_at: chrono::Utc::now(),
            records_dir: records_dir.display().to_string(),
            files: report.files,
            files_failed: report.files_failed.clone(),
            documents: report.documents,
            skipped: report.skipped,
            size_bytes: self.calculate_dir_size()?,
        };

        let json = serde_json::to_string_pretty(&metadata)?;
        fs::write(self.metadata_path(), json).context("Failed to write index metadata")?;
        Ok(metadata)
    }

    /// Load build metadata
    pub fn load_metadata(&self) -> Result<IndexMetadata> {
        let json = fs::read_to_string(self.metadata_path())?;
        let metadata: IndexMetadata = serde_json::from_str(&json)?;
        Ok(metadata)
    }

    /// Remove the index directory
    pub fn remove_index(&self) -> Result<()> {
        if self.index_dir.exists() {
            fs::remove_dir_all(&self.index_dir).with_context(|| {
                format!("Failed to remove index: {}", self.index_dir.display())
            })?;
        }
        Ok(())
    }

    /// Move the index directory aside and return where it went
    pub fn backup_index(&self) -> Result<PathBuf> {
        if !self.index_dir.exists() {
            bail!("Index not found at {}", self.index_dir.display());
        }

        let backup_path = self.sibling_path(&format!(
            ".backup-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));

        fs::rename(&self.index_dir, &backup_path).with_context(|| {
            format!("Failed to back up index {}", self.index_dir.display())
        })?;

        Ok(backup_path)
    }

    /// Put a backup back in place of the index directory
    pub fn restore_index_from_backup(&self, backup_path: &Path) -> Result<()> {
        if !backup_path.exists() {
            bail!("Backup path does not exist: {}", backup_path.display());
        }

        // Remove whatever a failed build left behind
        self.remove_index()
            .context("Failed to remove partial index before restore")?;

        fs::rename(backup_path, &self.index_dir).with_context(|| {
            format!(
                "Failed to restore index {} from backup",
                self.index_dir.display()
            )
        })?;

        Ok(())
    }

    /// Clean up a backup
    pub fn cleanup_backup(&self, backup_path: &Path) -> Result<()> {
        if backup_path.exists() {
            fs::remove_dir_all(backup_path).with_context(|| {
                format!("Failed to cleanup backup at {}", backup_path.display())
            })?;
        }
        Ok(())
    }
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut total_size = 0;
    if !path.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total_size += dir_size(&entry.path())?;
        } else {
            total_size += metadata.len();
        }
    }

    Ok(total_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sibling_paths() {
        let storage = IndexStorage::new("/data/fairmof/index");
        assert_eq!(storage.lock_path(), PathBuf::from("/data/fairmof/index.lock"));
        assert_eq!(
            storage.metadata_path(),
            PathBuf::from("/data/fairmof/index_metadata.json")
        );
    }

    #[test]
    fn test_exists_needs_meta_json() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = IndexStorage::new(temp_dir.path().join("index"));
        assert!(!storage.exists());

        storage.ensure_dir(storage.index_dir())?;
        assert!(!storage.exists());

        fs::write(storage.index_dir().join("meta.json"), "{}")?;
        assert!(storage.exists());
        Ok(())
    }

    #[test]
    fn test_backup_and_restore() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = IndexStorage::new(temp_dir.path().join("index"));
        storage.ensure_dir(storage.index_dir())?;
        fs::write(storage.index_dir().join("segment"), "original")?;

        let backup = storage.backup_index()?;
        assert!(!storage.index_dir().exists());

        storage.ensure_dir(storage.index_dir())?;
        fs::write(storage.index_dir().join("segment"), "partial")?;

        storage.restore_index_from_backup(&backup)?;
        assert!(!backup.exists());
        assert_eq!(
            fs::read_to_string(storage.index_dir().join("segment"))?,
            "original"
        );
        Ok(())
    }

    #[test]
    fn test_metadata_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = IndexStorage::new(temp_dir.path().join("index"));
        storage.ensure_dir(storage.index_dir())?;

        let report = IndexReport {
            files: 2,
            files_failed: vec!["bad.json".to_string()],
            documents: 10,
            skipped: 1,
        };
        let saved = storage.save_metadata(Path::new("/records"), &report)?;
        let loaded = storage.load_metadata()?;
        assert_eq!(saved, loaded);
        assert_eq!(loaded.documents, 10);
        Ok(())
    }

    #[test]
    fn test_locks_can_be_taken_in_turn() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = IndexStorage::new(temp_dir.path().join("index"));

        let exclusive = storage.lock_exclusive()?;
        drop(exclusive);
        let first = storage.lock_shared()?;
        let second = storage.lock_shared()?;
        drop((first, second));
        assert!(storage.lock_path().exists());
        Ok(())
    }
}
