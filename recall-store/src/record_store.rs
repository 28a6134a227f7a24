//! Durable per-record JSON persistence.

use std::path::{Path, PathBuf};

use recall_primitives::MemoryId;
use tokio::fs;
use tracing::{debug, warn};

use crate::MemoryResult;
use crate::error::StorageContext;
use crate::files::{list_with_extension, read_if_exists, remove_if_exists, write_atomic};
use crate::record::MemoryRecord;

const RECORD_EXTENSION: &str = "json";

/// One pretty-printed JSON file per record, named `<uuid>.json`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Opens (or creates) the record directory.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Storage`](crate::MemoryError::Storage) when the
    /// directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> MemoryResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.at_path(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory holding the record files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing `id`.
    #[must_use]
    pub fn path_for(&self, id: MemoryId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Writes or atomically replaces the record.
    ///
    /// # Errors
    ///
    /// Propagates serialization and storage failures; the previous version
    /// of the file is left intact when the write fails.
    pub async fn save(&self, record: &MemoryRecord) -> MemoryResult<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let path = self.path_for(record.id());
        write_atomic(&path, &bytes).await?;
        debug!(memory_id = %record.id(), "record saved");
        Ok(())
    }

    /// Loads a record, returning `None` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns storage errors and decoding errors for corrupt files.
    pub async fn load(&self, id: MemoryId) -> MemoryResult<Option<MemoryRecord>> {
        let Some(bytes) = read_if_exists(&self.path_for(id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }

    /// Deletes the record file. Absent files are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Storage`](crate::MemoryError::Storage) when the
    /// file exists but cannot be removed.
    pub async fn delete(&self, id: MemoryId) -> MemoryResult<bool> {
        let removed = remove_if_exists(&self.path_for(id)).await?;
        debug!(memory_id = %id, removed, "record delete");
        Ok(removed)
    }

    /// Enumerates every live record id exactly once, sorted.
    ///
    /// # Errors
    ///
    /// Returns storage errors raised while reading the directory.
    pub async fn list_ids(&self) -> MemoryResult<Vec<MemoryId>> {
        let mut ids = Vec::new();
        for (stem, path) in list_with_extension(&self.dir, RECORD_EXTENSION).await? {
            match stem.parse::<MemoryId>() {
                Ok(id) => ids.push(id),
                Err(err) => warn!(path = %path.display(), %err, "skipping foreign record file"),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Loads every record. Files removed between listing and loading are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the first storage or decoding error encountered.
    pub async fn load_all(&self) -> MemoryResult<Vec<MemoryRecord>> {
        let ids = self.list_ids().await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load(id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
