//! Orchestrates record, vector and tag persistence behind one facade.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use recall_primitives::{ContentType, MemoryId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::embeddings::{EmbeddingProvider, EmbeddingVector};
use crate::record::{DEFAULT_IMPORTANCE, MemoryRecord, MemoryUpdate};
use crate::record_store::RecordStore;
use crate::tags::TagRegistry;
use crate::vectors::{FlatVectorStore, VectorIndex, similarity_from_distance};
use crate::{MemoryError, MemoryResult};

/// Embedding width used when none is configured.
pub const DEFAULT_EMBEDDING_DIMENSIONS: NonZeroUsize = NonZeroUsize::new(1536).unwrap();

/// Result count used by [`SearchQuery::new`].
pub const DEFAULT_TOP_K: NonZeroUsize = NonZeroUsize::new(5).unwrap();

const MEMORIES_DIR: &str = "memories";
const EMBEDDINGS_DIR: &str = "embeddings";
const TAGS_FILE: &str = "tags.json";

/// Location and shape of a memory store on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryServiceConfig {
    base_dir: PathBuf,
    dimensions: NonZeroUsize,
}

impl MemoryServiceConfig {
    /// Creates a configuration rooted at `base_dir` using
    /// [`DEFAULT_EMBEDDING_DIMENSIONS`].
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Sets the embedding dimension.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: NonZeroUsize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the embedding dimension.
    #[must_use]
    pub fn dimensions(&self) -> NonZeroUsize {
        self.dimensions
    }

    /// `<base>/memories`
    #[must_use]
    pub fn memories_dir(&self) -> PathBuf {
        self.base_dir.join(MEMORIES_DIR)
    }

    /// `<base>/embeddings`
    #[must_use]
    pub fn embeddings_dir(&self) -> PathBuf {
        self.base_dir.join(EMBEDDINGS_DIR)
    }

    /// `<base>/tags.json`
    #[must_use]
    pub fn tags_path(&self) -> PathBuf {
        self.base_dir.join(TAGS_FILE)
    }
}

/// Builder for [`MemoryService`] instances.
pub struct MemoryServiceBuilder {
    config: MemoryServiceConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Box<dyn VectorIndex>>,
}

impl MemoryServiceBuilder {
    /// Starts a new builder for the supplied configuration.
    #[must_use]
    pub fn new(config: MemoryServiceConfig) -> Self {
        Self {
            config,
            embedder: None,
            vector_index: None,
        }
    }

    /// Installs the embedding provider. This is required before calling
    /// [`build`](Self::build).
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Replaces the default [`FlatVectorStore`] with another index.
    #[must_use]
    pub fn with_vector_index(mut self, index: Box<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Opens the stores and builds the similarity index from disk.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] when no embedder was supplied or
    /// a custom index disagrees on the dimension, and storage errors raised
    /// while opening the stores.
    pub async fn build(self) -> MemoryResult<MemoryService> {
        let embedder = self
            .embedder
            .ok_or(MemoryError::InvalidConfig("embedding provider not configured"))?;

        let vectors: Box<dyn VectorIndex> = match self.vector_index {
            Some(index) => {
                if index.dimensions() != self.config.dimensions.get() {
                    return Err(MemoryError::InvalidConfig(
                        "vector index dimension differs from configuration",
                    ));
                }
                index
            }
            None => Box::new(
                FlatVectorStore::open(self.config.embeddings_dir(), self.config.dimensions)
                    .await?,
            ),
        };
        let records = RecordStore::open(self.config.memories_dir()).await?;
        let tags = TagRegistry::open(self.config.tags_path()).await?;

        info!(
            base_dir = %self.config.base_dir.display(),
            dimensions = self.config.dimensions.get(),
            indexed = vectors.len(),
            "memory service opened"
        );

        Ok(MemoryService {
            config: self.config,
            records,
            vectors,
            tags,
            embedder,
        })
    }
}

/// Input for [`MemoryService::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    content: String,
    content_type: ContentType,
    metadata: Map<String, Value>,
    tags: Vec<String>,
    importance: f64,
}

impl NewMemory {
    /// Creates a request with no tags, no metadata and default importance.
    #[must_use]
    pub fn new(content: impl Into<String>, content_type: impl Into<ContentType>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
            metadata: Map::new(),
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Returns the text that will be embedded.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns the requested tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the requested metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    fn into_record(self) -> MemoryResult<MemoryRecord> {
        MemoryRecord::builder(self.content, self.content_type)
            .tags(self.tags)?
            .merge_metadata(self.metadata)
            .importance(self.importance)
            .build()
    }
}

/// Parameters of a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    text: String,
    content_type: Option<ContentType>,
    tags: Vec<String>,
    top_k: NonZeroUsize,
}

impl SearchQuery {
    /// Creates a query returning at most [`DEFAULT_TOP_K`] results.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            content_type: None,
            tags: Vec::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Keeps only hits of this content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Keeps only hits carrying every listed tag.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how many nearest vectors are retrieved before filtering.
    #[must_use]
    pub fn with_top_k(mut self, top_k: NonZeroUsize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Returns the query text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the retrieval size.
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k.get()
    }

    fn accepts(&self, record: &MemoryRecord) -> bool {
        if let Some(content_type) = &self.content_type {
            if record.content_type() != content_type {
                return false;
            }
        }
        self.tags.iter().all(|tag| record.has_tag(tag))
    }
}

/// A search hit: the stored record and its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    record: MemoryRecord,
    score: f32,
}

impl ScoredMemory {
    /// Returns the matched record.
    #[must_use]
    pub fn record(&self) -> &MemoryRecord {
        &self.record
    }

    /// Returns the similarity score in `[0, 1]`.
    #[must_use]
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Consumes the hit, returning the record.
    #[must_use]
    pub fn into_record(self) -> MemoryRecord {
        self.record
    }
}

/// Counts describing the persisted and indexed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Persisted record files.
    pub records: usize,
    /// Persisted vector files.
    pub vectors: usize,
    /// Entries held by the in-memory index.
    pub indexed: usize,
    /// Known tags.
    pub tags: usize,
}

/// CRUD and similarity search over persisted memories.
///
/// Mutating operations take `&mut self`: one owner performs writes, and
/// sharing across tasks requires an external lock. Every operation awaits the
/// embedding provider without timeout or retry.
pub struct MemoryService {
    pub(crate) config: MemoryServiceConfig,
    pub(crate) records: RecordStore,
    pub(crate) vectors: Box<dyn VectorIndex>,
    pub(crate) tags: TagRegistry,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryService")
            .field("config", &self.config)
            .field("indexed", &self.vectors.len())
            .field("tags", &self.tags.len())
            .finish_non_exhaustive()
    }
}

impl MemoryService {
    /// Creates a builder for a memory service.
    #[must_use]
    pub fn builder(config: MemoryServiceConfig) -> MemoryServiceBuilder {
        MemoryServiceBuilder::new(config)
    }

    /// Opens a service with the default flat vector store.
    ///
    /// # Errors
    ///
    /// See [`MemoryServiceBuilder::build`].
    pub async fn open(
        config: MemoryServiceConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> MemoryResult<Self> {
        Self::builder(config).with_embedder(embedder).build().await
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &MemoryServiceConfig {
        &self.config
    }

    /// Returns every tag ever registered.
    #[must_use]
    pub fn all_tags(&self) -> &[String] {
        self.tags.all()
    }

    /// Returns the vector index.
    #[must_use]
    pub fn vector_index(&self) -> &dyn VectorIndex {
        self.vectors.as_ref()
    }

    /// Embeds, validates and unit-normalises `text`.
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        let raw = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::embedding)?;
        let expected = self.config.dimensions.get();
        if raw.len() != expected {
            return Err(MemoryError::validation(format!(
                "embedding provider returned {} dimensions, expected {expected}",
                raw.len()
            )));
        }
        EmbeddingVector::new(raw)?.normalized()
    }

    /// Stores a new memory.
    ///
    /// The embedding is computed before anything is written, so a provider
    /// failure leaves no trace on disk.
    ///
    /// # Errors
    ///
    /// Returns validation, embedding provider and storage errors.
    pub async fn add(&mut self, memory: NewMemory) -> MemoryResult<MemoryRecord> {
        let record = memory.into_record()?;
        let vector = self.embed(record.content()).await?;

        self.tags.ensure(record.tags()).await?;
        self.records.save(&record).await?;
        if let Err(err) = self.vectors.put(record.id(), &vector).await {
            // Drop the fresh record so no record exists without its vector.
            if let Err(rollback) = self.records.delete(record.id()).await {
                warn!(memory_id = %record.id(), ?rollback, "failed to roll back record");
            }
            return Err(err);
        }

        debug!(
            memory_id = %record.id(),
            content_type = %record.content_type(),
            tags = record.tags().len(),
            "memory added"
        );
        Ok(record)
    }

    /// Loads a memory.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub async fn get(&self, id: MemoryId) -> MemoryResult<Option<MemoryRecord>> {
        self.records.load(id).await
    }

    /// Loads a memory that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] when absent, plus storage errors.
    pub async fn require(&self, id: MemoryId) -> MemoryResult<MemoryRecord> {
        self.get(id).await?.ok_or(MemoryError::NotFound(id))
    }

    /// Applies an update, returning `false` when `id` is unknown.
    ///
    /// Changed content is embedded first; if that fails nothing is persisted.
    /// Updates that keep the content leave the stored vector untouched.
    ///
    /// # Errors
    ///
    /// Returns validation, embedding provider and storage errors.
    pub async fn update(&mut self, id: MemoryId, update: MemoryUpdate) -> MemoryResult<bool> {
        let Some(mut record) = self.records.load(id).await? else {
            return Ok(false);
        };
        let update = update.validate()?;

        let vector = match update.content.as_deref() {
            Some(content) if content != record.content() => Some(self.embed(content).await?),
            _ => None,
        };

        if let Some(tags) = &update.tags {
            self.tags.ensure(tags).await?;
        }
        let previous = record.clone();
        record.apply(update);
        self.records.save(&record).await?;
        if let Some(vector) = &vector {
            if let Err(err) = self.vectors.put(id, vector).await {
                // Restore the old record so its content still matches the stored vector.
                if let Err(rollback) = self.records.save(&previous).await {
                    warn!(memory_id = %id, ?rollback, "failed to roll back record");
                }
                return Err(err);
            }
        }

        debug!(memory_id = %id, reembedded = vector.is_some(), "memory updated");
        Ok(true)
    }

    /// Removes a memory and its vector, returning whether anything existed.
    ///
    /// # Errors
    ///
    /// Returns the storage error of whichever removal failed.
    pub async fn delete(&mut self, id: MemoryId) -> MemoryResult<bool> {
        let record_removed = self.records.delete(id).await?;
        let vector_removed = self.vectors.remove(id).await?;
        debug!(memory_id = %id, record_removed, vector_removed, "memory deleted");
        Ok(record_removed || vector_removed)
    }

    /// Similarity search.
    ///
    /// Retrieves the `top_k` nearest vectors, then drops hits that fail the
    /// content type or tag filters. Filtering happens after retrieval, so
    /// fewer than `top_k` results may come back even when more matching
    /// memories exist further away.
    ///
    /// # Errors
    ///
    /// Returns embedding provider, validation and storage errors.
    pub async fn search(&self, query: SearchQuery) -> MemoryResult<Vec<ScoredMemory>> {
        let embedding = self.embed(query.text()).await?;
        let neighbors = self.vectors.knn(&embedding, query.top_k())?;

        let mut hits = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(record) = self.records.load(neighbor.id()).await? else {
                warn!(memory_id = %neighbor.id(), "indexed vector has no record");
                continue;
            };
            if !query.accepts(&record) {
                continue;
            }
            hits.push(ScoredMemory {
                record,
                score: similarity_from_distance(neighbor.distance()),
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.top_k());
        debug!(hits = hits.len(), top_k = query.top_k(), "search complete");
        Ok(hits)
    }

    /// Every memory of the given type (full scan).
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub async fn get_all_memories_by_type(
        &self,
        content_type: &ContentType,
    ) -> MemoryResult<Vec<MemoryRecord>> {
        self.scan(|record| record.content_type() == content_type)
            .await
    }

    /// Memories carrying every listed tag (`require_all`) or at least one.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub async fn get_memories_by_tags<S>(
        &self,
        tags: &[S],
        require_all: bool,
    ) -> MemoryResult<Vec<MemoryRecord>>
    where
        S: AsRef<str>,
    {
        self.scan(|record| {
            if require_all {
                tags.iter().all(|tag| record.has_tag(tag.as_ref()))
            } else {
                tags.iter().any(|tag| record.has_tag(tag.as_ref()))
            }
        })
        .await
    }

    pub(crate) async fn scan<F>(&self, mut keep: F) -> MemoryResult<Vec<MemoryRecord>>
    where
        F: FnMut(&MemoryRecord) -> bool,
    {
        let mut records = self.records.load_all().await?;
        records.retain(|record| keep(record));
        Ok(records)
    }
}
