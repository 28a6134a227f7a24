//! Typed constructors for the well-known memory kinds, and the lookups that
//! go with them.

use recall_primitives::ContentType;
use serde_json::{Map, Value};

use crate::MemoryResult;
use crate::record::{DEFAULT_IMPORTANCE, MemoryRecord};
use crate::service::{MemoryService, NewMemory};

/// Tag forced onto API documentation memories.
pub const API_TAG: &str = "api";
/// Tag forced onto test case memories.
pub const TEST_TAG: &str = "test";
/// Tag forced onto conversation memories.
pub const CONVERSATION_TAG: &str = "conversation";

/// Fixed metadata first, caller metadata layered on top (caller keys win),
/// canonical tag appended when missing.
fn assemble(
    content: String,
    content_type: ContentType,
    fixed: Map<String, Value>,
    extra: Map<String, Value>,
    mut tags: Vec<String>,
    canonical_tag: &str,
    importance: f64,
) -> NewMemory {
    let mut metadata = fixed;
    metadata.extend(extra);
    if !tags.iter().any(|tag| tag == canonical_tag) {
        tags.push(canonical_tag.to_owned());
    }
    NewMemory::new(content, content_type)
        .with_metadata(metadata)
        .with_tags(tags)
        .with_importance(importance)
}

fn optional(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}

/// An API operation description.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiDocMemory {
    content: String,
    api_path: String,
    method: String,
    summary: Option<String>,
    description: Option<String>,
    request_example: Option<String>,
    response_example: Option<String>,
    metadata: Map<String, Value>,
    tags: Vec<String>,
    importance: f64,
}

impl ApiDocMemory {
    /// Describes `method api_path` with `content` as the embedded text.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        api_path: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            api_path: api_path.into(),
            method: method.into(),
            summary: None,
            description: None,
            request_example: None,
            response_example: None,
            metadata: Map::new(),
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    /// Sets the one-line summary.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the long description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets an example request body.
    #[must_use]
    pub fn request_example(mut self, example: impl Into<String>) -> Self {
        self.request_example = Some(example.into());
        self
    }

    /// Sets an example response body.
    #[must_use]
    pub fn response_example(mut self, example: impl Into<String>) -> Self {
        self.response_example = Some(example.into());
        self
    }

    /// Adds caller metadata, which overrides the fixed keys.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the tags; `api` is appended if missing.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Lowers into a generic [`NewMemory`].
    #[must_use]
    pub fn into_new_memory(self) -> NewMemory {
        let mut fixed = Map::new();
        fixed.insert("api_path".into(), Value::String(self.api_path));
        fixed.insert("method".into(), Value::String(self.method));
        fixed.insert("summary".into(), optional(self.summary));
        fixed.insert("description".into(), optional(self.description));
        fixed.insert("request_example".into(), optional(self.request_example));
        fixed.insert("response_example".into(), optional(self.response_example));
        assemble(
            self.content,
            ContentType::ApiDoc,
            fixed,
            self.metadata,
            self.tags,
            API_TAG,
            self.importance,
        )
    }
}

/// A test case, optionally linked to the API doc memory it exercises.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseMemory {
    content: String,
    test_name: String,
    test_type: String,
    test_script: String,
    api_doc_id: Option<String>,
    metadata: Map<String, Value>,
    tags: Vec<String>,
    importance: f64,
}

impl TestCaseMemory {
    /// Creates a test case memory.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        test_name: impl Into<String>,
        test_type: impl Into<String>,
        test_script: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            test_name: test_name.into(),
            test_type: test_type.into(),
            test_script: test_script.into(),
            api_doc_id: None,
            metadata: Map::new(),
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    /// Links the test case to an API doc memory id.
    #[must_use]
    pub fn api_doc_id(mut self, api_doc_id: impl Into<String>) -> Self {
        self.api_doc_id = Some(api_doc_id.into());
        self
    }

    /// Adds caller metadata, which overrides the fixed keys.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the tags; `test` is appended if missing.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Lowers into a generic [`NewMemory`].
    #[must_use]
    pub fn into_new_memory(self) -> NewMemory {
        let mut fixed = Map::new();
        fixed.insert("test_name".into(), Value::String(self.test_name));
        fixed.insert("test_type".into(), Value::String(self.test_type));
        fixed.insert("test_script".into(), Value::String(self.test_script));
        fixed.insert("api_doc_id".into(), optional(self.api_doc_id));
        assemble(
            self.content,
            ContentType::TestCase,
            fixed,
            self.metadata,
            self.tags,
            TEST_TAG,
            self.importance,
        )
    }
}

/// One conversation turn. The message itself is the embedded content.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMemory {
    role: String,
    message: String,
    metadata: Map<String, Value>,
    tags: Vec<String>,
    importance: f64,
}

impl ConversationMemory {
    /// Creates a conversation memory for `role` saying `message`.
    #[must_use]
    pub fn new(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            message: message.into(),
            metadata: Map::new(),
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    /// Adds caller metadata, which overrides the fixed keys.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the tags; `conversation` is appended if missing.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Lowers into a generic [`NewMemory`].
    #[must_use]
    pub fn into_new_memory(self) -> NewMemory {
        let mut fixed = Map::new();
        fixed.insert("role".into(), Value::String(self.role));
        fixed.insert("message".into(), Value::String(self.message.clone()));
        assemble(
            self.message,
            ContentType::Conversation,
            fixed,
            self.metadata,
            self.tags,
            CONVERSATION_TAG,
            self.importance,
        )
    }
}

impl MemoryService {
    /// Stores an API documentation memory.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::add`].
    pub async fn add_api_doc_memory(&mut self, memory: ApiDocMemory) -> MemoryResult<MemoryRecord> {
        self.add(memory.into_new_memory()).await
    }

    /// Stores a test case memory.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::add`].
    pub async fn add_test_case_memory(
        &mut self,
        memory: TestCaseMemory,
    ) -> MemoryResult<MemoryRecord> {
        self.add(memory.into_new_memory()).await
    }

    /// Stores a conversation memory.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::add`].
    pub async fn add_conversation_memory(
        &mut self,
        memory: ConversationMemory,
    ) -> MemoryResult<MemoryRecord> {
        self.add(memory.into_new_memory()).await
    }

    /// First API doc memory whose metadata matches `api_path` and `method`.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub async fn get_api_doc_by_path_method(
        &self,
        api_path: &str,
        method: &str,
    ) -> MemoryResult<Option<MemoryRecord>> {
        let matches = self
            .scan(|record| {
                *record.content_type() == ContentType::ApiDoc
                    && record.metadata_str("api_path") == Some(api_path)
                    && record.metadata_str("method") == Some(method)
            })
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Test case memories linked to `api_doc_id`.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub async fn get_test_cases_for_api(
        &self,
        api_doc_id: &str,
    ) -> MemoryResult<Vec<MemoryRecord>> {
        self.scan(|record| {
            *record.content_type() == ContentType::TestCase
                && record.metadata_str("api_doc_id") == Some(api_doc_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_doc_fills_fixed_keys_and_forces_tag() {
        let memory = ApiDocMemory::new("POST /users creates a user", "/users", "POST")
            .summary("Create user")
            .tags(["user"])
            .into_new_memory();

        assert_eq!(memory.content_type(), &ContentType::ApiDoc);
        assert_eq!(memory.tags(), ["user", "api"]);
        assert_eq!(memory.metadata()["api_path"], "/users");
        assert_eq!(memory.metadata()["summary"], "Create user");
        assert_eq!(memory.metadata()["description"], Value::Null);
        assert_eq!(memory.metadata().len(), 6);
    }

    #[test]
    fn caller_metadata_overrides_fixed_keys() {
        let mut extra = Map::new();
        extra.insert("method".into(), json!("PUT"));
        extra.insert("owner".into(), json!("qa"));
        let memory = ApiDocMemory::new("doc", "/users", "POST")
            .metadata(extra)
            .into_new_memory();

        assert_eq!(memory.metadata()["method"], "PUT");
        assert_eq!(memory.metadata()["owner"], "qa");
    }

    #[test]
    fn canonical_tag_is_not_duplicated() {
        let memory = TestCaseMemory::new("checks login", "login_ok", "functional", "curl ...")
            .tags(["test", "auth"])
            .into_new_memory();
        assert_eq!(memory.tags(), ["test", "auth"]);
        assert_eq!(memory.metadata()["api_doc_id"], Value::Null);
    }

    #[test]
    fn conversation_embeds_the_message() {
        let memory = ConversationMemory::new("user", "hello there").into_new_memory();
        assert_eq!(memory.content(), "hello there");
        assert_eq!(memory.content_type(), &ContentType::Conversation);
        assert_eq!(memory.metadata()["role"], "user");
        assert_eq!(memory.metadata()["message"], "hello there");
        assert_eq!(memory.tags(), ["conversation"]);
    }
}
