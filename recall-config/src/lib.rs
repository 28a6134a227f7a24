//! Configuration for the recall memory store.
//!
//! [`RecallConfig`] can be read from a JSON file, from `RECALL_*`
//! environment variables, or both (file first, then environment overrides).
//! Every field has a default so partial files are accepted.

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use recall_store::MemoryServiceConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding [`RecallConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "RECALL_DATA_DIR";
/// Environment variable overriding [`RecallConfig::embedding_dimension`].
pub const EMBEDDING_DIMENSION_ENV: &str = "RECALL_EMBEDDING_DIMENSION";
/// Environment variable overriding [`EmbeddingSettings::model`].
pub const EMBEDDING_MODEL_ENV: &str = "RECALL_EMBEDDING_MODEL";
/// Environment variable overriding [`EmbeddingSettings::base_url`].
pub const EMBEDDING_BASE_URL_ENV: &str = "RECALL_EMBEDDING_BASE_URL";

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be interpreted.
    #[error("invalid value for {var}: {reason}")]
    Env {
        /// Offending variable.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A loaded value violates a constraint.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of the violated constraint.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Remote embedding endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model identifier sent with every request.
    pub model: String,
    /// API root; `v1/embeddings` is appended.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_owned(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".to_owned(),
        }
    }
}

impl EmbeddingSettings {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Base directory of the memory store.
    pub data_dir: PathBuf,
    /// Length of every stored embedding.
    pub embedding_dimension: usize,
    /// Embedding endpoint settings.
    pub embedding: EmbeddingSettings,
    /// Default `tracing` filter directive.
    pub log_filter: String,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("res/memory_data"),
            embedding_dimension: 1536,
            embedding: EmbeddingSettings::default(),
            log_filter: "info".to_owned(),
        }
    }
}

impl RecallConfig {
    /// Reads a JSON file, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Defaults overridden by `RECALL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] for unparsable overrides.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `RECALL_*` environment overrides on top of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] for unparsable overrides.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|var| env::var(var).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(EMBEDDING_DIMENSION_ENV) {
            self.embedding_dimension =
                raw.trim().parse().map_err(|err| ConfigError::Env {
                    var: EMBEDDING_DIMENSION_ENV,
                    reason: format!("{raw:?} is not an integer: {err}"),
                })?;
        }
        if let Some(model) = lookup(EMBEDDING_MODEL_ENV) {
            self.embedding.model = model;
        }
        if let Some(base_url) = lookup(EMBEDDING_BASE_URL_ENV) {
            self.embedding.base_url = base_url;
        }
        Ok(self)
    }

    /// Checks value constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero dimension, a blank model,
    /// a base URL without an http(s) scheme or a zero timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::invalid("embedding_dimension must be positive"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_dir must not be empty"));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::invalid("embedding.model must not be empty"));
        }
        let base_url = self.embedding.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "embedding.base_url must start with http:// or https://",
            ));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::invalid("embedding.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Builds the store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the dimension is zero.
    pub fn store_config(&self) -> ConfigResult<MemoryServiceConfig> {
        let dimensions = NonZeroUsize::new(self.embedding_dimension)
            .ok_or_else(|| ConfigError::invalid("embedding_dimension must be positive"))?;
        Ok(MemoryServiceConfig::new(&self.data_dir).with_dimensions(dimensions))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use uuid::Uuid;

    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let mut path = env::temp_dir();
        path.push(format!("recall-config-{}.json", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let config = RecallConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("res/memory_data"));
        assert_eq!(config.embedding_dimension, 1536);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.timeout(), Duration::from_secs(60));
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = temp_file(r#"{ "embedding_dimension": 384, "embedding": { "model": "local" } }"#);
        let config = RecallConfig::from_json_file(&path).unwrap();
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.embedding.model, "local");
        assert_eq!(config.embedding.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.log_filter, "info");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let path = temp_file("{ not json");
        let err = RecallConfig::from_json_file(&path).expect_err("parse");
        assert!(matches!(err, ConfigError::Parse { .. }));
        let _ = std::fs::remove_file(path);

        let err = RecallConfig::from_json_file(env::temp_dir().join(Uuid::new_v4().to_string()))
            .expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn environment_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (DATA_DIR_ENV, "/var/lib/recall"),
            (EMBEDDING_DIMENSION_ENV, " 768 "),
            (EMBEDDING_MODEL_ENV, "nomic-embed-text"),
        ]
        .into_iter()
        .collect();

        let config = RecallConfig::default()
            .with_overrides(|var| vars.get(var).map(|value| (*value).to_owned()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/recall"));
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.embedding.base_url, "https://api.openai.com/");
    }

    #[test]
    fn bad_dimension_override_is_rejected() {
        let err = RecallConfig::default()
            .with_overrides(|var| (var == EMBEDDING_DIMENSION_ENV).then(|| "wide".to_owned()))
            .expect_err("not a number");
        assert!(matches!(
            err,
            ConfigError::Env {
                var: EMBEDDING_DIMENSION_ENV,
                ..
            }
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = RecallConfig {
            embedding_dimension: 0,
            ..RecallConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(config.store_config().is_err());

        config.embedding_dimension = 8;
        config.embedding.base_url = "ftp://example.com".to_owned();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn store_config_maps_paths_and_dimension() {
        let config = RecallConfig {
            data_dir: PathBuf::from("/tmp/recall"),
            embedding_dimension: 32,
            ..RecallConfig::default()
        };
        let store = config.store_config().unwrap();
        assert_eq!(store.base_dir(), Path::new("/tmp/recall"));
        assert_eq!(store.dimensions().get(), 32);
        assert_eq!(store.tags_path(), PathBuf::from("/tmp/recall/tags.json"));
    }
}
