//! Filesystem helpers shared by the persistent stores.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::MemoryResult;
use crate::error::StorageContext;

/// Suffix appended to in-flight writes; such files are never listed.
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so a
/// reader observes either the old or the new contents.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> MemoryResult<()> {
    let temp = temp_path(path);
    let written = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await;

    if let Err(source) = written {
        discard(&temp).await;
        return Err(source).at_path(&temp);
    }

    if let Err(source) = fs::rename(&temp, path).await {
        discard(&temp).await;
        return Err(source).at_path(path);
    }
    Ok(())
}

async fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp).await {
        if err.kind() != ErrorKind::NotFound {
            warn!(path = %temp.display(), ?err, "failed to discard temp file");
        }
    }
}

/// Reads a file, mapping "not found" to `None`.
pub(crate) async fn read_if_exists(path: &Path) -> MemoryResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).at_path(path),
    }
}

/// Removes a file, returning whether it existed.
pub(crate) async fn remove_if_exists(path: &Path) -> MemoryResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).at_path(path),
    }
}

/// Removes a directory tree if present.
pub(crate) async fn remove_dir_if_exists(path: &Path) -> MemoryResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).at_path(path),
    }
}

/// Lists `(stem, path)` for regular files in `dir` carrying `extension`.
pub(crate) async fn list_with_extension(
    dir: &Path,
    extension: &str,
) -> MemoryResult<Vec<(String, PathBuf)>> {
    let mut entries = fs::read_dir(dir).await.at_path(dir)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.at_path(dir)? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let file_type = entry.file_type().await.at_path(&path)?;
        if !file_type.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            found.push((stem.to_owned(), path.clone()));
        }
    }
    Ok(found)
}

/// Copies a directory tree, returning the number of bytes copied.
pub(crate) async fn copy_dir_recursive(source: &Path, destination: &Path) -> MemoryResult<u64> {
    fs::create_dir_all(destination).await.at_path(destination)?;
    let mut total_size = 0u64;
    let mut stack = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((src_path, dest_path)) = stack.pop() {
        let metadata = fs::metadata(&src_path).await.at_path(&src_path)?;
        if metadata.is_file() {
            total_size += fs::copy(&src_path, &dest_path).await.at_path(&dest_path)?;
        } else if metadata.is_dir() {
            fs::create_dir_all(&dest_path).await.at_path(&dest_path)?;
            let mut dir = fs::read_dir(&src_path).await.at_path(&src_path)?;
            while let Some(entry) = dir.next_entry().await.at_path(&src_path)? {
                stack.push((entry.path(), dest_path.join(entry.file_name())));
            }
        }
    }

    Ok(total_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("recall-files-{}", Uuid::new_v4()));
        path
    }

    #[tokio::test]
    async fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("value.json");

        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"two");
        assert!(!temp_path(&path).exists());
        assert_eq!(
            temp_path(&path).file_name().unwrap().to_str(),
            Some("value.json.tmp")
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_files_are_not_errors() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("absent.bin");

        assert!(read_if_exists(&path).await.unwrap().is_none());
        assert!(!remove_if_exists(&path).await.unwrap());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn copies_nested_trees() {
        let source = temp_dir();
        let nested = source.join("inner");
        fs::create_dir_all(&nested).await.unwrap();
        fs::write(source.join("a.txt"), b"abc").await.unwrap();
        fs::write(nested.join("b.txt"), b"de").await.unwrap();

        let destination = temp_dir();
        let copied = copy_dir_recursive(&source, &destination).await.unwrap();
        assert_eq!(copied, 5);
        assert_eq!(fs::read(destination.join("inner/b.txt")).await.unwrap(), b"de");

        let _ = std::fs::remove_dir_all(source);
        let _ = std::fs::remove_dir_all(destination);
    }
}
