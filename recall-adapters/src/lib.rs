//! Embedding providers backed by remote services.
//!
//! Adapters implement [`recall_store::EmbeddingProvider`] so they can be
//! handed straight to a [`recall_store::MemoryService`].

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod openai;

mod http_client;

pub use error::{AdapterError, AdapterResult};
pub use openai::{OpenAiEmbedder, OpenAiEmbeddingConfig};
