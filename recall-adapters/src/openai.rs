//! `OpenAI`-compatible embeddings adapter.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Body, Request, StatusCode, Uri};
use recall_store::{BoxError, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::http_client::{HyperClient, build_https_client};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/";

/// Configuration for [`OpenAiEmbedder`].
#[derive(Clone)]
pub struct OpenAiEmbeddingConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    dimensions: Option<usize>,
}

impl fmt::Debug for OpenAiEmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbeddingConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("dimensions", &self.dimensions)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OpenAiEmbeddingConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(60),
            dimensions: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        Self::from_env_var(model, OPENAI_API_KEY_ENV)
    }

    /// Loads the API key from a custom environment variable.
    #[must_use]
    pub fn from_env_var(model: impl Into<String>, var: &str) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(var).ok().filter(|key| !key.trim().is_empty());
        cfg
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Asks the provider to shorten vectors to `dimensions` components.
    ///
    /// Only the `text-embedding-3` family honours this field.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the sanitised base URL (always ending in `/`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Embedding provider calling `<base>v1/embeddings` over HTTPS.
///
/// Every failure is reported as an error; no fallback vector is ever
/// returned.
pub struct OpenAiEmbedder {
    client: HyperClient,
    endpoint: Uri,
    model: String,
    api_key: String,
    timeout: Duration,
    dimensions: Option<usize>,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Constructs a new embedder with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or
    /// the endpoint cannot be formed.
    pub fn new(config: OpenAiEmbeddingConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdapterError::configuration("OpenAI embedder requires an API key"))?;
        if config.model.trim().is_empty() {
            return Err(AdapterError::configuration("embedding model must not be empty"));
        }

        let endpoint = format!("{}v1/embeddings", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
            })?;

        let client = build_https_client();

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key,
            timeout: config.timeout,
            dimensions: config.dimensions,
        })
    }

    /// Returns the model used for requests.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, input: &'a str) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input,
            encoding_format: "float",
            dimensions: self.dimensions,
        }
    }

    /// Requests the embedding of `text`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] for blank input,
    /// [`AdapterError::Transport`] for network failures and timeouts,
    /// [`AdapterError::RateLimited`] for HTTP 429 and
    /// [`AdapterError::Response`] for other error statuses or bodies
    /// without an embedding.
    pub async fn request_embedding(&self, text: &str) -> AdapterResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AdapterError::invalid_request("cannot embed blank text"));
        }

        let payload = self.build_request(text);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode embedding request: {err}"))
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build embedding request: {err}"))
            })?;

        debug!(model = %self.model, chars = text.len(), "requesting embedding");

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::transport("embedding request timed out"))?
            .map_err(|err| AdapterError::transport(format!("embedding request failed: {err}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read embedding response: {err}"))
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::response(format!(
                "OpenAI returned {status}: {reason}"
            )));
        }

        let embedding = decode_embedding(&bytes)?;
        debug!(
            model = %self.model,
            dimensions = embedding.len(),
            "embedding received"
        );
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        self.request_embedding(text).await.map_err(Into::into)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn decode_embedding(bytes: &[u8]) -> AdapterResult<Vec<f32>> {
    let response: EmbeddingResponse = serde_json::from_slice(bytes).map_err(|err| {
        AdapterError::response(format!("failed to decode embedding response: {err}"))
    })?;
    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|data| data.embedding)
        .ok_or_else(|| AdapterError::response("embedding response contained no data"))?;
    if embedding.is_empty() {
        return Err(AdapterError::response("embedding response vector is empty"));
    }
    Ok(embedding)
}

fn sanitize_base_url(input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "OpenAI base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid OpenAI base URL: {err}")))?;
    Ok(base)
}
