//! Query embedding service using OpenAI

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use tracing::debug;

use crate::{Error, Result};

/// Model used when the configuration does not name one.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Inputs longer than this are truncated before embedding.
const MAX_INPUT_CHARS: usize = 8000;

/// Service for embedding search queries
#[derive(Clone)]
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl EmbeddingService {
    /// Create from `OPENAI_API_KEY`
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::ConfigError("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        }
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let config = self.client.config().clone().with_api_base(api_base.into());
        self.client = OpenAIClient::with_config(config);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single query text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = prepare_input(text);
        if input.is_empty() {
            return Err(Error::InvalidArgument(
                "cannot embed an empty query".to_string(),
            ));
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(input))
            .build()?;

        let response = self.client.embeddings().create(request).await?;
        debug!(
            model = %self.model,
            tokens = response.usage.total_tokens,
            "Embedded search query"
        );

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| Error::OpenAiError("No embedding returned".to_string()))
    }

    /// Embedding dimension for the configured model
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }
}

fn prepare_input(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_INPUT_CHARS) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}
