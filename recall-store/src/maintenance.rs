//! Export, backup, reset and stats.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use recall_primitives::ContentType;
use serde_json::Value;
use tokio::fs;
use tracing::info;

use crate::error::StorageContext;
use crate::files::{copy_dir_recursive, remove_dir_if_exists};
use crate::record_store::RecordStore;
use crate::service::{MemoryService, StoreStats};
use crate::{MemoryError, MemoryResult};

const METADATA_PREFIX: &str = "metadata_";
const BACKUP_PREFIX: &str = "memory_backup_";

impl MemoryService {
    /// Writes one CSV row per record, optionally restricted to one content
    /// type, and returns the number of rows.
    ///
    /// Columns are the record fields (sorted) followed by one sorted
    /// `metadata_<key>` column per metadata key seen. Tags are joined with a
    /// comma. No file is written when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] for an empty or directory path,
    /// and storage errors.
    pub async fn export_to_csv(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&ContentType>,
    ) -> MemoryResult<usize> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(MemoryError::validation("export path must not be empty"));
        }
        if path.is_dir() {
            return Err(MemoryError::validation(format!(
                "export path {} is a directory",
                path.display()
            )));
        }

        let mut records = self
            .scan(|record| content_type.is_none_or(|wanted| record.content_type() == wanted))
            .await?;
        if records.is_empty() {
            return Ok(0);
        }
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });

        let mut rows = Vec::with_capacity(records.len());
        let mut fields = BTreeSet::new();
        let mut metadata_keys = BTreeSet::new();
        for record in &records {
            let Value::Object(mut row) = serde_json::to_value(record)? else {
                continue;
            };
            let metadata = row.remove("metadata");
            fields.extend(row.keys().cloned());
            if let Some(Value::Object(metadata)) = metadata {
                for (key, value) in metadata {
                    let column = format!("{METADATA_PREFIX}{key}");
                    metadata_keys.insert(column.clone());
                    row.insert(column, value);
                }
            }
            rows.push(row);
        }

        let columns: Vec<String> = fields.into_iter().chain(metadata_keys).collect();
        let mut out = String::new();
        write_row(&mut out, columns.iter().map(String::as_str));
        for row in &rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|column| render_cell(column, row.get(column)))
                .collect();
            write_row(&mut out, cells.iter().map(String::as_str));
        }

        fs::write(path, out).await.at_path(path)?;
        info!(path = %path.display(), rows = rows.len(), "memories exported");
        Ok(rows.len())
    }

    /// Copies the whole base directory into
    /// `<dir>/memory_backup_<YYYYMMDD_HHMMSS>/` and returns that path.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] when the destination lies inside
    /// the store or already exists, and storage errors.
    pub async fn backup(&self, dir: impl AsRef<Path>) -> MemoryResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await.at_path(dir)?;

        let base = fs::canonicalize(self.config.base_dir())
            .await
            .at_path(self.config.base_dir())?;
        let target_root = fs::canonicalize(dir).await.at_path(dir)?;
        if target_root.starts_with(&base) {
            return Err(MemoryError::validation(
                "backup directory must be outside the memory store",
            ));
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let destination = dir.join(format!("{BACKUP_PREFIX}{stamp}"));
        if fs::try_exists(&destination).await.at_path(&destination)? {
            return Err(MemoryError::validation(format!(
                "backup destination {} already exists",
                destination.display()
            )));
        }

        let bytes = copy_dir_recursive(self.config.base_dir(), &destination).await?;
        info!(destination = %destination.display(), bytes, "memory store backed up");
        Ok(destination)
    }

    /// Deletes every record, vector and the tag file, then recreates empty
    /// storage and an empty index. Irreversible; meant for tests and resets.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn clear_all_data(&mut self) -> MemoryResult<()> {
        let memories_dir = self.config.memories_dir();
        remove_dir_if_exists(&memories_dir).await?;
        self.records = RecordStore::open(memories_dir).await?;
        self.vectors.clear().await?;
        self.tags.clear().await?;
        info!(base_dir = %self.config.base_dir().display(), "memory store cleared");
        Ok(())
    }

    /// Counts persisted records, persisted vectors, indexed vectors and tags.
    ///
    /// # Errors
    ///
    /// Returns storage errors raised while listing directories.
    pub async fn stats(&self) -> MemoryResult<StoreStats> {
        Ok(StoreStats {
            records: self.records.list_ids().await?.len(),
            vectors: self.vectors.persisted_ids().await?.len(),
            indexed: self.vectors.len(),
            tags: self.tags.len(),
        })
    }
}

fn render_cell(column: &str, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) if column == "tags" => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (index, cell) in cells.enumerate() {
        if index > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\n', '\r']) {
            let _ = write!(out, "\"{}\"", cell.replace('"', "\"\""));
        } else {
            out.push_str(cell);
        }
    }
    out.push_str("\r\n");
}
