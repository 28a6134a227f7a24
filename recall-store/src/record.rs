//! Memory records and the explicit update request.

use chrono::{DateTime, Utc};
use recall_primitives::{ContentType, MemoryId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MemoryError, MemoryResult};

/// Importance assigned when the caller does not choose one.
pub const DEFAULT_IMPORTANCE: f64 = 1.0;

fn default_importance() -> f64 {
    DEFAULT_IMPORTANCE
}

/// A stored memory. The embedding lives in the vector store, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    id: MemoryId,
    content: String,
    content_type: ContentType,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default = "default_importance")]
    importance: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Creates a builder for a new memory record with a fresh v4 id.
    #[must_use]
    pub fn builder(content: impl Into<String>, content_type: ContentType) -> MemoryRecordBuilder {
        let now = Utc::now();
        MemoryRecordBuilder {
            id: MemoryId::random(),
            content: content.into(),
            content_type,
            tags: Vec::new(),
            metadata: Map::new(),
            importance: DEFAULT_IMPORTANCE,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the unique identifier for this record.
    #[must_use]
    pub fn id(&self) -> MemoryId {
        self.id
    }

    /// Returns the embedded text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns associated tags in display order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns whether the record carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    /// Returns metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns the string value stored under a metadata key, if any.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Returns the caller-assigned priority.
    #[must_use]
    pub fn importance(&self) -> f64 {
        self.importance
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the timestamp of the last persisted change.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies a validated update and bumps `updated_at`.
    pub(crate) fn apply(&mut self, update: ValidatedUpdate) {
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(importance) = update.importance {
            self.importance = importance;
        }
        self.updated_at = Utc::now().max(self.created_at);
    }
}

/// Builder type used to assemble [`MemoryRecord`] instances safely.
#[derive(Debug)]
pub struct MemoryRecordBuilder {
    id: MemoryId,
    content: String,
    content_type: ContentType,
    tags: Vec<String>,
    metadata: Map<String, Value>,
    importance: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemoryRecordBuilder {
    /// Adds a single tag after validating that it is not empty. Tags already
    /// present are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] when the tag is empty or whitespace.
    pub fn tag(mut self, tag: impl Into<String>) -> MemoryResult<Self> {
        let value = validate_tag(tag.into())?;
        if !self.tags.contains(&value) {
            self.tags.push(value);
        }
        Ok(self)
    }

    /// Extends the record with multiple tags.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] if any supplied tag is empty.
    pub fn tags<I, S>(mut self, tags: I) -> MemoryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self = self.tag(tag)?;
        }
        Ok(self)
    }

    /// Adds metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds a full metadata map, overwriting existing keys when duplicates occur.
    #[must_use]
    pub fn merge_metadata(mut self, map: Map<String, Value>) -> Self {
        self.metadata.extend(map);
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Finalises the builder and produces the record.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] when the importance is not finite.
    pub fn build(self) -> MemoryResult<MemoryRecord> {
        validate_importance(self.importance)?;
        Ok(MemoryRecord {
            id: self.id,
            content: self.content,
            content_type: self.content_type,
            tags: self.tags,
            metadata: self.metadata,
            importance: self.importance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Explicit update request. Only these four fields of a record are mutable;
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryUpdate {
    content: Option<String>,
    tags: Option<Vec<String>>,
    metadata: Option<Map<String, Value>>,
    importance: Option<f64>,
}

impl MemoryUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the content; a changed content triggers re-embedding.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Replaces the full tag list.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the full metadata map.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Replaces the importance.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub(crate) fn validate(self) -> MemoryResult<ValidatedUpdate> {
        let tags = self.tags.map(normalize_tags).transpose()?;
        if let Some(importance) = self.importance {
            validate_importance(importance)?;
        }
        Ok(ValidatedUpdate {
            content: self.content,
            tags,
            metadata: self.metadata,
            importance: self.importance,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ValidatedUpdate {
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<Vec<String>>,
    pub(crate) metadata: Option<Map<String, Value>>,
    pub(crate) importance: Option<f64>,
}

/// Validates tags and drops duplicates, keeping first-seen order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> MemoryResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = validate_tag(tag)?;
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}

fn validate_tag(tag: String) -> MemoryResult<String> {
    if tag.trim().is_empty() {
        return Err(MemoryError::validation("memory tags must not be empty"));
    }
    Ok(tag)
}

fn validate_importance(importance: f64) -> MemoryResult<()> {
    if importance.is_finite() {
        Ok(())
    } else {
        Err(MemoryError::validation("importance must be a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_tags() {
        let err = MemoryRecord::builder("payload", ContentType::Conversation)
            .tag("")
            .expect_err("empty tag should fail");
        assert!(matches!(err, MemoryError::Validation { .. }));

        let err = MemoryRecord::builder("payload", ContentType::Conversation)
            .tags(vec!["ok", " "])
            .expect_err("whitespace tag should fail");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn builder_constructs_record() {
        let record = MemoryRecord::builder("payload", ContentType::from("generic"))
            .tags(["weather", "sky", "weather"])
            .unwrap()
            .metadata("key", Value::from("value"))
            .build()
            .unwrap();

        assert_eq!(record.content(), "payload");
        assert_eq!(record.tags(), ["weather", "sky"]);
        assert_eq!(record.metadata_str("key"), Some("value"));
        assert!((record.importance() - DEFAULT_IMPORTANCE).abs() < f64::EPSILON);
        assert_eq!(record.created_at(), record.updated_at());
    }

    #[test]
    fn builder_rejects_nan_importance() {
        let err = MemoryRecord::builder("payload", ContentType::ApiDoc)
            .importance(f64::NAN)
            .build()
            .expect_err("nan importance");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn persisted_form_has_no_embedding_and_plain_content_type() {
        let record = MemoryRecord::builder("payload", ContentType::TestCase)
            .build()
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["content_type"], "test_case");
        assert_eq!(json["id"], record.id().to_string());

        let decoded: MemoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn apply_replaces_only_requested_fields() {
        let mut record = MemoryRecord::builder("before", ContentType::Conversation)
            .tag("a")
            .unwrap()
            .metadata("role", Value::from("user"))
            .build()
            .unwrap();
        let update = MemoryUpdate::new().importance(2.5).validate().unwrap();
        record.apply(update);

        assert_eq!(record.content(), "before");
        assert_eq!(record.tags(), ["a"]);
        assert_eq!(record.metadata_str("role"), Some("user"));
        assert!((record.importance() - 2.5).abs() < f64::EPSILON);
        assert!(record.updated_at() >= record.created_at());
    }

    #[test]
    fn update_validation_rejects_blank_tags() {
        let err = MemoryUpdate::new()
            .tags(["fine", ""])
            .validate()
            .expect_err("blank tag");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }
}
