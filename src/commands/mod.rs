//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod ask;
pub mod chat;
pub mod retrieve;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::graph::{EmbeddingService, Neo4jGraphSearch};
use crate::integrations::OpenAIClient;
use crate::language::WhatlangDetector;
use crate::orchestrator::Orchestrator;
use crate::Result;

/// Build the production pipeline: whatlang, Neo4j hybrid search, OpenAI.
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let mut embedder = EmbeddingService::from_env(config.openai.embedding_model.clone())?;
    if let Some(base_url) = &config.openai.base_url {
        embedder = embedder.with_api_base(base_url.clone());
    }

    let search = Neo4jGraphSearch::connect(&config.neo4j, embedder).await?;
    let answerer = OpenAIClient::from_env(&config.openai)?;

    info!(
        model = %answerer.model(),
        top_k = config.retrieval.top_k,
        policy = ?config.retrieval.bundle_policy,
        "Assistant pipeline ready"
    );

    Ok(Orchestrator::new(
        Arc::new(WhatlangDetector),
        Arc::new(search),
        Arc::new(answerer),
    )
    .with_top_k(config.retrieval.top_k)
    .with_bundle_policy(config.retrieval.bundle_policy))
}
