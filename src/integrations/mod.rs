//! External integrations module.
//!
//! Provides:
//! - the `Answerer` seam for language-model answer generation
//! - an OpenAI chat-completions client implementing it

pub mod openai;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::conversation::Message;
use crate::language::Language;
use crate::Result;

pub use openai::OpenAIClient;

/// Answer text delivered in order; the concatenation is the full answer.
pub type AnswerStream = BoxStream<'static, Result<String>>;

/// Generates an answer from history, graph context and reply language.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// `history` ends with the current question.
    async fn generate(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<String>;

    /// Incremental variant. Defaults to a single chunk from [`Answerer::generate`].
    async fn generate_stream(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<AnswerStream> {
        let answer = self.generate(history, graph_context, language).await?;
        Ok(stream::once(async move { Ok(answer) }).boxed())
    }
}
