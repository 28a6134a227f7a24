//! Durable vector persistence and the brute-force similarity index.
//!
//! Vectors live at `<dir>/<uuid>.f32` as raw little-endian components. The
//! in-memory index (a flat row-major matrix plus a parallel id list) is a
//! cache: it is reconstructed from every persisted file on open and after
//! every `put`/`remove`. That O(N) rebuild per mutation is the documented
//! contract of [`FlatVectorStore`]; alternative strategies belong in another
//! [`VectorIndex`] implementation.

use std::io::{self, ErrorKind};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use recall_primitives::MemoryId;
use tokio::fs;
use tracing::{debug, warn};

use crate::embeddings::{COMPONENT_BYTES, EmbeddingVector, squared_l2};
use crate::error::StorageContext;
use crate::files::{
    list_with_extension, read_if_exists, remove_dir_if_exists, remove_if_exists, write_atomic,
};
use crate::{MemoryError, MemoryResult};

const VECTOR_EXTENSION: &str = "f32";

/// Converts a squared L2 distance between unit vectors into a similarity
/// score: `1 - d/2` for `d <= 2`, otherwise `0`.
///
/// For unit-normalised vectors this equals their cosine similarity clamped
/// at zero. The value is meaningless for vectors that are not normalised.
#[must_use]
pub fn similarity_from_distance(distance: f32) -> f32 {
    if distance <= 2.0 {
        1.0 - distance / 2.0
    } else {
        0.0
    }
}

/// Nearest-neighbour hit returned by [`VectorIndex::knn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    id: MemoryId,
    distance: f32,
}

impl Neighbor {
    /// Creates a neighbour entry.
    #[must_use]
    pub fn new(id: MemoryId, distance: f32) -> Self {
        Self { id, distance }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> MemoryId {
        self.id
    }

    /// Returns the squared L2 distance to the query.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Returns [`similarity_from_distance`] of this hit.
    #[must_use]
    pub fn similarity(&self) -> f32 {
        similarity_from_distance(self.distance)
    }
}

/// Interface for persisted vector indexes.
///
/// After every completed mutation the set of indexed ids must equal the set
/// of persisted vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Configured vector dimension.
    fn dimensions(&self) -> usize;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Returns whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently held by the in-memory index, in index order.
    fn indexed_ids(&self) -> Vec<MemoryId>;

    /// Persists a vector, replacing any previous one for `id`.
    async fn put(&mut self, id: MemoryId, vector: &EmbeddingVector) -> MemoryResult<()>;

    /// Loads the persisted vector for `id`.
    async fn get(&self, id: MemoryId) -> MemoryResult<Option<EmbeddingVector>>;

    /// Deletes the persisted vector if present, returning whether it existed.
    async fn remove(&mut self, id: MemoryId) -> MemoryResult<bool>;

    /// Deletes every persisted vector and empties the index.
    async fn clear(&mut self) -> MemoryResult<()>;

    /// Reconstructs the in-memory index from persisted state.
    async fn rebuild(&mut self) -> MemoryResult<()>;

    /// Ids that currently have a persisted vector.
    async fn persisted_ids(&self) -> MemoryResult<Vec<MemoryId>>;

    /// Returns up to `k` nearest ids by ascending squared L2 distance.
    fn knn(&self, query: &EmbeddingVector, k: usize) -> MemoryResult<Vec<Neighbor>>;
}

/// File-backed vector store with an exhaustive in-memory index.
#[derive(Debug)]
pub struct FlatVectorStore {
    dir: PathBuf,
    dimensions: NonZeroUsize,
    ids: Vec<MemoryId>,
    matrix: Vec<f32>,
}

impl FlatVectorStore {
    /// Opens (or creates) the vector directory and builds the index.
    ///
    /// # Errors
    ///
    /// Returns storage errors, and fails when a persisted vector is corrupt
    /// or has the wrong dimension.
    pub async fn open(dir: impl Into<PathBuf>, dimensions: NonZeroUsize) -> MemoryResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.at_path(&dir)?;
        let mut store = Self {
            dir,
            dimensions,
            ids: Vec::new(),
            matrix: Vec::new(),
        };
        store.rebuild().await?;
        Ok(store)
    }

    /// Returns the directory holding the vector files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing `id`.
    #[must_use]
    pub fn path_for(&self, id: MemoryId) -> PathBuf {
        self.dir.join(format!("{id}.{VECTOR_EXTENSION}"))
    }

    fn check_dimensions(&self, vector: &EmbeddingVector) -> MemoryResult<()> {
        if vector.len() == self.dimensions.get() {
            Ok(())
        } else {
            Err(MemoryError::validation(format!(
                "vector has {} dimensions, store expects {}",
                vector.len(),
                self.dimensions
            )))
        }
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> MemoryResult<EmbeddingVector> {
        let expected = self.dimensions.get() * COMPONENT_BYTES;
        if bytes.len() != expected {
            return Err(MemoryError::storage(
                path,
                io::Error::new(
                    ErrorKind::InvalidData,
                    format!("vector file has {} bytes, expected {expected}", bytes.len()),
                ),
            ));
        }
        EmbeddingVector::from_le_bytes(bytes).map_err(|err| {
            MemoryError::storage(path, io::Error::new(ErrorKind::InvalidData, err.to_string()))
        })
    }

    async fn persisted_entries(&self) -> MemoryResult<Vec<(MemoryId, PathBuf)>> {
        let mut entries = Vec::new();
        for (stem, path) in list_with_extension(&self.dir, VECTOR_EXTENSION).await? {
            match stem.parse::<MemoryId>() {
                Ok(id) => entries.push((id, path)),
                Err(err) => warn!(path = %path.display(), %err, "skipping foreign vector file"),
            }
        }
        entries.sort_unstable_by_key(|(id, _)| *id);
        Ok(entries)
    }
}

#[async_trait]
impl VectorIndex for FlatVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions.get()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn indexed_ids(&self) -> Vec<MemoryId> {
        self.ids.clone()
    }

    async fn put(&mut self, id: MemoryId, vector: &EmbeddingVector) -> MemoryResult<()> {
        self.check_dimensions(vector)?;
        let path = self.path_for(id);
        let previous = read_if_exists(&path).await?;
        write_atomic(&path, &vector.to_le_bytes()).await?;
        debug!(memory_id = %id, "vector persisted");
        if let Err(err) = self.rebuild().await {
            // The in-memory index is untouched on failure; only the file needs undoing.
            let restored = match &previous {
                Some(bytes) => write_atomic(&path, bytes).await,
                None => remove_if_exists(&path).await.map(|_| ()),
            };
            if let Err(restore_err) = restored {
                warn!(memory_id = %id, error = %restore_err, "failed to roll back vector file");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn get(&self, id: MemoryId) -> MemoryResult<Option<EmbeddingVector>> {
        let path = self.path_for(id);
        match read_if_exists(&path).await? {
            Some(bytes) => self.decode(&path, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn remove(&mut self, id: MemoryId) -> MemoryResult<bool> {
        let removed = remove_if_exists(&self.path_for(id)).await?;
        debug!(memory_id = %id, removed, "vector delete");
        self.rebuild().await?;
        Ok(removed)
    }

    async fn clear(&mut self) -> MemoryResult<()> {
        remove_dir_if_exists(&self.dir).await?;
        fs::create_dir_all(&self.dir).await.at_path(&self.dir)?;
        self.rebuild().await
    }

    async fn rebuild(&mut self) -> MemoryResult<()> {
        let entries = self.persisted_entries().await?;
        let mut ids = Vec::with_capacity(entries.len());
        let mut matrix = Vec::with_capacity(entries.len() * self.dimensions.get());

        for (id, path) in entries {
            // A file may vanish between listing and reading.
            let Some(bytes) = read_if_exists(&path).await? else {
                continue;
            };
            let vector = self.decode(&path, &bytes)?;
            matrix.extend_from_slice(vector.as_slice());
            ids.push(id);
        }

        self.ids = ids;
        self.matrix = matrix;
        debug!(indexed = self.ids.len(), "similarity index rebuilt");
        Ok(())
    }

    async fn persisted_ids(&self) -> MemoryResult<Vec<MemoryId>> {
        Ok(self
            .persisted_entries()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    fn knn(&self, query: &EmbeddingVector, k: usize) -> MemoryResult<Vec<Neighbor>> {
        self.check_dimensions(query)?;
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .matrix
            .chunks_exact(self.dimensions.get())
            .zip(self.ids.iter())
            .map(|(row, id)| Neighbor::new(*id, squared_l2(query.as_slice(), row)))
            .collect();

        // Stable sort keeps id order among equal distances.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("recall-vectors-{}", Uuid::new_v4()));
        path
    }

    fn dims(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn vector(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::from_slice(values).unwrap()
    }

    #[tokio::test]
    async fn knn_orders_by_ascending_distance() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        let near = MemoryId::random();
        let far = MemoryId::random();
        let mid = MemoryId::random();
        store.put(near, &vector(&[1.0, 0.0])).await.unwrap();
        store.put(far, &vector(&[-1.0, 0.0])).await.unwrap();
        store.put(mid, &vector(&[0.0, 1.0])).await.unwrap();

        let hits = store.knn(&vector(&[1.0, 0.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id(), near);
        assert_eq!(hits[1].id(), mid);
        assert!(hits[0].distance().abs() < f32::EPSILON);
        assert!((hits[1].distance() - 2.0).abs() < 1e-6);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_index_and_zero_k_return_nothing() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        assert!(store.knn(&vector(&[1.0, 0.0]), 3).unwrap().is_empty());

        store.put(MemoryId::random(), &vector(&[1.0, 0.0])).await.unwrap();
        assert!(store.knn(&vector(&[1.0, 0.0]), 0).unwrap().is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn put_rejects_wrong_dimension() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(3)).await.unwrap();
        let id = MemoryId::random();

        let err = store.put(id, &vector(&[1.0, 0.0])).await.expect_err("dim");
        assert!(matches!(err, MemoryError::Validation { .. }));
        assert!(!store.path_for(id).exists());
        assert!(store.is_empty());

        let err = store.knn(&vector(&[1.0]), 1).expect_err("query dim");
        assert!(matches!(err, MemoryError::Validation { .. }));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn index_tracks_persisted_files() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        let first = MemoryId::random();
        let second = MemoryId::random();
        store.put(first, &vector(&[1.0, 0.0])).await.unwrap();
        store.put(second, &vector(&[0.0, 1.0])).await.unwrap();
        store.put(first, &vector(&[0.0, 1.0])).await.unwrap();
        assert_eq!(store.len(), 2);

        assert!(store.remove(first).await.unwrap());
        assert!(!store.remove(first).await.unwrap());
        assert_eq!(store.indexed_ids(), vec![second]);
        assert_eq!(store.persisted_ids().await.unwrap(), vec![second]);
        assert_eq!(store.get(second).await.unwrap(), Some(vector(&[0.0, 1.0])));
        assert!(store.get(first).await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn reopening_rebuilds_from_disk() {
        let dir = temp_dir();
        let id = MemoryId::random();
        {
            let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
            store.put(id, &vector(&[0.6, 0.8])).await.unwrap();
        }
        let reopened = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        assert_eq!(reopened.indexed_ids(), vec![id]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn corrupt_vector_file_fails_rebuild() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        fs::write(store.path_for(MemoryId::random()), [0u8; 5])
            .await
            .unwrap();

        let err = store.rebuild().await.expect_err("corrupt");
        assert!(matches!(err, MemoryError::Storage { .. }));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn failed_rebuild_undoes_put() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        let existing = MemoryId::random();
        store.put(existing, &vector(&[1.0, 0.0])).await.unwrap();
        fs::write(store.path_for(MemoryId::random()), [0u8; 5])
            .await
            .unwrap();

        let fresh = MemoryId::random();
        let err = store.put(fresh, &vector(&[0.0, 1.0])).await.expect_err("corrupt");
        assert!(matches!(err, MemoryError::Storage { .. }));
        assert!(!store.path_for(fresh).exists());

        store.put(existing, &vector(&[0.0, 1.0])).await.expect_err("corrupt");
        assert_eq!(store.get(existing).await.unwrap(), Some(vector(&[1.0, 0.0])));
        assert_eq!(store.indexed_ids(), vec![existing]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let dir = temp_dir();
        let mut store = FlatVectorStore::open(&dir, dims(2)).await.unwrap();
        store.put(MemoryId::random(), &vector(&[1.0, 0.0])).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
        assert!(store.persisted_ids().await.unwrap().is_empty());
        assert!(dir.exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn similarity_transform() {
        assert!((similarity_from_distance(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((similarity_from_distance(1.0) - 0.5).abs() < f32::EPSILON);
        assert!(similarity_from_distance(2.0).abs() < f32::EPSILON);
        assert!(similarity_from_distance(3.5).abs() < f32::EPSILON);
    }
}
