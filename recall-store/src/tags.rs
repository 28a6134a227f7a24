//! Append-only registry of every tag ever used.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::MemoryResult;
use crate::files::{remove_if_exists, write_atomic};

/// Persisted as a JSON array of strings. The registry only grows; deleting
/// every record that uses a tag does not remove it.
#[derive(Debug)]
pub struct TagRegistry {
    path: PathBuf,
    tags: Vec<String>,
}

impl TagRegistry {
    /// Loads the registry, treating a missing or unreadable file as empty and
    /// re-persisting an empty set in that case.
    ///
    /// # Errors
    ///
    /// Fails only when the empty replacement cannot be written.
    pub async fn open(path: impl Into<PathBuf>) -> MemoryResult<Self> {
        let path = path.into();
        let loaded = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(tags) => Some(tags),
                Err(err) => {
                    warn!(path = %path.display(), %err, "tag registry corrupt; starting empty");
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "tag registry missing; starting empty");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "tag registry unreadable; starting empty");
                None
            }
        };

        let mut registry = Self {
            path,
            tags: Vec::new(),
        };
        match loaded {
            Some(tags) => {
                for tag in tags {
                    if !registry.tags.contains(&tag) {
                        registry.tags.push(tag);
                    }
                }
            }
            None => persist(&registry.path, &registry.tags).await?,
        }
        Ok(registry)
    }

    /// Returns the registry file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds unseen names, persists the full set and hands the input back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns storage errors raised while persisting.
    pub async fn ensure<'a>(&mut self, names: &'a [String]) -> MemoryResult<&'a [String]> {
        let mut tags = self.tags.clone();
        for name in names {
            if !tags.contains(name) {
                tags.push(name.clone());
            }
        }
        persist(&self.path, &tags).await?;
        self.tags = tags;
        Ok(names)
    }

    /// Returns every known tag in first-seen order.
    #[must_use]
    pub fn all(&self) -> &[String] {
        &self.tags
    }

    /// Returns whether `tag` has ever been registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|known| known == tag)
    }

    /// Number of known tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns whether no tag was ever registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Deletes the registry file and recreates it empty.
    ///
    /// # Errors
    ///
    /// Returns storage errors raised while deleting or rewriting the file.
    pub async fn clear(&mut self) -> MemoryResult<()> {
        remove_if_exists(&self.path).await?;
        persist(&self.path, &[]).await?;
        self.tags.clear();
        Ok(())
    }
}

async fn persist(path: &Path, tags: &[String]) -> MemoryResult<()> {
    let bytes = serde_json::to_vec(tags)?;
    write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("recall-tags-{}.json", Uuid::new_v4()));
        path
    }

    async fn read_tags(path: &Path) -> Vec<String> {
        serde_json::from_slice(&fs::read(path).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn ensure_is_append_only_and_persisted() {
        let path = temp_path();
        let mut registry = TagRegistry::open(&path).await.unwrap();
        assert!(registry.is_empty());
        assert!(read_tags(&path).await.is_empty());

        let input = vec!["api".to_owned(), "user".to_owned()];
        let returned = registry.ensure(&input).await.unwrap();
        assert_eq!(returned, input.as_slice());
        registry
            .ensure(&["user".to_owned(), "create".to_owned()])
            .await
            .unwrap();

        assert_eq!(registry.all(), ["api", "user", "create"]);
        assert_eq!(read_tags(&path).await, ["api", "user", "create"]);

        let reopened = TagRegistry::open(&path).await.unwrap();
        assert!(reopened.contains("create"));
        assert_eq!(reopened.len(), 3);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_file_self_heals() {
        let path = temp_path();
        fs::write(&path, b"[\"half").await.unwrap();

        let registry = TagRegistry::open(&path).await.unwrap();
        assert!(registry.is_empty());
        assert!(read_tags(&path).await.is_empty());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_write_keeps_known_tags() {
        let dir = std::env::temp_dir().join(format!("recall-tags-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("tags.json");
        let mut registry = TagRegistry::open(&path).await.unwrap();
        registry.ensure(&["api".to_owned()]).await.unwrap();

        fs::remove_dir_all(&dir).await.unwrap();
        registry
            .ensure(&["api".to_owned(), "orphan".to_owned()])
            .await
            .expect_err("parent directory is gone");
        assert_eq!(registry.all(), ["api"]);
        assert!(!registry.contains("orphan"));
    }

    #[tokio::test]
    async fn clear_resets_to_empty_file() {
        let path = temp_path();
        let mut registry = TagRegistry::open(&path).await.unwrap();
        registry.ensure(&["x".to_owned()]).await.unwrap();
        registry.clear().await.unwrap();

        assert!(registry.is_empty());
        assert!(read_tags(&path).await.is_empty());

        let _ = std::fs::remove_file(path);
    }
}
