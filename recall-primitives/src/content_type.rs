//! Semantic category attached to every memory.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category of a stored memory.
///
/// The set is open: anything that is not one of the well-known labels is
/// carried verbatim as [`ContentType::Custom`]. On disk the type is always the
/// plain label string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// Flattened API documentation (`api_doc`).
    ApiDoc,
    /// Generated or curated test cases (`test_case`).
    TestCase,
    /// A single conversation turn (`conversation`).
    Conversation,
    /// Caller-supplied label.
    Custom(String),
}

impl ContentType {
    /// Builds a content type from a caller-supplied label.
    ///
    /// Well-known labels map onto their dedicated variants, so
    /// `ContentType::custom("api_doc")` yields [`ContentType::ApiDoc`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] when the label is blank.
    pub fn custom(label: impl Into<String>) -> Result<Self> {
        let value = label.into();
        if value.trim().is_empty() {
            return Err(Error::InvalidContentType {
                reason: "content type label must not be empty".into(),
            });
        }
        Ok(Self::from(value))
    }

    /// Returns the label used on disk and in exports.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiDoc => "api_doc",
            Self::TestCase => "test_case",
            Self::Conversation => "conversation",
            Self::Custom(label) => label,
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "api_doc" => Self::ApiDoc,
            "test_case" => Self::TestCase,
            "conversation" => Self::Conversation,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Custom(label) => label,
            other => other.as_str().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_labels_collapse_onto_variants() {
        assert_eq!(ContentType::from("api_doc"), ContentType::ApiDoc);
        assert_eq!(ContentType::custom("conversation").unwrap(), ContentType::Conversation);
        assert_eq!(
            ContentType::from("generic"),
            ContentType::Custom("generic".into())
        );
    }

    #[test]
    fn blank_custom_label_is_rejected() {
        let err = ContentType::custom("  ").expect_err("blank label");
        assert!(matches!(err, Error::InvalidContentType { .. }));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ContentType::TestCase).unwrap();
        assert_eq!(json, "\"test_case\"");
        let decoded: ContentType = serde_json::from_str("\"notes\"").unwrap();
        assert_eq!(decoded.as_str(), "notes");
    }
}
