//! Walks through the memory service: typed inserts, search, tag queries,
//! update, CSV export and stats.
//!
//! Runs offline with a hashing embedder unless `--remote` is passed, in which
//! case the configured OpenAI-compatible endpoint is used.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use recall::adapters::{OpenAiEmbedder, OpenAiEmbeddingConfig};
use recall::config::RecallConfig;
use recall::store::{ApiDocMemory, BoxError, ConversationMemory, TestCaseMemory};
use recall::telemetry::{TelemetryConfig, init_tracing};
use recall::{ContentType, EmbeddingProvider, MemoryService, MemoryUpdate, SearchQuery};
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Exercise the recall memory store")]
struct Args {
    /// JSON configuration file; `RECALL_*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use the configured remote embedding endpoint.
    #[arg(long)]
    remote: bool,

    /// Wipe the store before running.
    #[arg(long)]
    reset: bool,

    /// Query to run against the stored memories.
    #[arg(long, default_value = "how do I create a user")]
    query: String,
}

/// Deterministic bag-of-words embedder for offline runs.
struct HashingEmbedder {
    dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            let bucket = usize::try_from(hash % self.dimensions as u64)?;
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|value| *value == 0.0) {
            return Err("text has no tokens to embed".into());
        }
        Ok(vector)
    }
}

fn load_config(args: &Args) -> Result<RecallConfig> {
    let mut config = match &args.config {
        Some(path) => RecallConfig::from_json_file(path)?.with_env_overrides()?,
        None => RecallConfig::from_env()?,
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }
    if !args.remote {
        config.embedding_dimension = 256;
    }
    config.validate()?;
    Ok(config)
}

fn embedder(config: &RecallConfig, remote: bool) -> Result<Arc<dyn EmbeddingProvider>> {
    if !remote {
        return Ok(Arc::new(HashingEmbedder {
            dimensions: config.embedding_dimension,
        }));
    }
    let settings = &config.embedding;
    let adapter_config =
        OpenAiEmbeddingConfig::from_env_var(&settings.model, &settings.api_key_env)
            .with_base_url(&settings.base_url)?
            .with_timeout(settings.timeout())
            .with_dimensions(config.embedding_dimension);
    let embedder = OpenAiEmbedder::new(adapter_config)
        .with_context(|| format!("set {} to use --remote", settings.api_key_env))?;
    Ok(Arc::new(embedder))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&TelemetryConfig::default().with_filter(&config.log_filter));

    let mut service =
        MemoryService::open(config.store_config()?, embedder(&config, args.remote)?).await?;
    if args.reset {
        service.clear_all_data().await?;
    }

    let doc = service
        .add_api_doc_memory(
            ApiDocMemory::new(
                "POST /api/v1/users creates a user from a JSON body with name and email",
                "/api/v1/users",
                "POST",
            )
            .summary("Create user")
            .response_example(r#"{"id": 42}"#)
            .tags(["users"]),
        )
        .await?;
    service
        .add_api_doc_memory(
            ApiDocMemory::new(
                "GET /api/v1/orders lists orders for the authenticated account",
                "/api/v1/orders",
                "GET",
            )
            .summary("List orders")
            .tags(["orders"]),
        )
        .await?;
    let case = service
        .add_test_case_memory(
            TestCaseMemory::new(
                "Creating a user with a duplicate email returns 409",
                "create_user_duplicate_email",
                "negative",
                "POST /api/v1/users twice with the same email",
            )
            .api_doc_id(doc.id().to_string())
            .tags(["users"]),
        )
        .await?;
    service
        .add_conversation_memory(ConversationMemory::new(
            "user",
            "Please focus the next test run on user creation",
        ))
        .await?;

    let hits = service
        .search(SearchQuery::new(&args.query).with_top_k(NonZeroUsize::new(3).context("top_k")?))
        .await?;
    for hit in &hits {
        info!(
            score = hit.score(),
            content_type = %hit.record().content_type(),
            "{}",
            hit.record().content()
        );
    }

    let linked = service.get_test_cases_for_api(&doc.id().to_string()).await?;
    info!(api_doc = %doc.id(), tests = linked.len(), "linked test cases");

    let tagged = service.get_memories_by_tags(&["users", "test"], true).await?;
    info!(count = tagged.len(), "memories tagged users+test");

    service
        .update(case.id(), MemoryUpdate::new().importance(2.0).tags(["users", "regression"]))
        .await?;

    let export = config.data_dir.join("api_docs.csv");
    let rows = service
        .export_to_csv(&export, Some(&ContentType::ApiDoc))
        .await?;
    info!(path = %export.display(), rows, "exported api docs");

    let stats = service.stats().await?;
    info!(stats = %serde_json::to_string(&stats)?, tags = ?service.all_tags(), "done");
    Ok(())
}
