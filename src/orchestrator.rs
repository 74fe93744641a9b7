//! Question handling: detection → search → assembly → answer → state update.
//!
//! A turn holds its conversation's lock from the first step to the final
//! `append_turn`, so turns within one conversation never interleave while
//! different conversations proceed independently. Nothing is written to the
//! conversation unless the answer completed.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, Message, SharedConversation};
use crate::graph::{ContextAssembler, ContextBundle, GraphSearch};
use crate::integrations::{AnswerStream, Answerer};
use crate::language::{detect_or_default, Language, LanguageDetector};
use crate::metrics;
use crate::prompts;
use crate::{Error, Result};

/// Which bundle is stored with a completed turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BundlePolicy {
    /// Store the computed bundle.
    #[default]
    Always,
    /// Store the computed bundle only if the answer cites the graph,
    /// otherwise an empty bundle.
    CitationGated,
}

impl BundlePolicy {
    pub fn select(&self, answer: &str, bundle: ContextBundle) -> ContextBundle {
        match self {
            BundlePolicy::Always => bundle,
            BundlePolicy::CitationGated if prompts::cites_graph(answer) => bundle,
            BundlePolicy::CitationGated => ContextBundle::empty(),
        }
    }
}

impl FromStr for BundlePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(BundlePolicy::Always),
            "citation" | "citation_gated" | "citation-gated" => Ok(BundlePolicy::CitationGated),
            other => Err(Error::InvalidArgument(format!(
                "unknown bundle policy '{}': expected always or citation",
                other
            ))),
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub question: String,
    pub answer: String,
    /// Language detected for the question itself.
    pub language: Language,
    /// Language the answer was generated in.
    pub effective_language: Language,
    /// Bundle stored for this turn.
    pub bundle: ContextBundle,
}

/// Retrieval result for a question, before answering.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub language: Language,
    pub bundle: ContextBundle,
}

struct PreparedTurn {
    language: Language,
    effective_language: Language,
    bundle: ContextBundle,
    history: Vec<Message>,
}

/// Wires language detection, graph search, assembly and answering together.
pub struct Orchestrator {
    detector: Arc<dyn LanguageDetector>,
    search: Arc<dyn GraphSearch>,
    answerer: Arc<dyn Answerer>,
    assembler: ContextAssembler,
    policy: BundlePolicy,
}

impl Orchestrator {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        search: Arc<dyn GraphSearch>,
        answerer: Arc<dyn Answerer>,
    ) -> Self {
        Self {
            detector,
            search,
            answerer,
            assembler: ContextAssembler::default(),
            policy: BundlePolicy::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.assembler = ContextAssembler::new(top_k);
        self
    }

    pub fn with_bundle_policy(mut self, policy: BundlePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn top_k(&self) -> usize {
        self.assembler.top_k()
    }

    pub fn bundle_policy(&self) -> BundlePolicy {
        self.policy
    }

    /// Detect the language and build the context bundle. No state changes.
    pub async fn retrieve(&self, question: &str) -> Result<Retrieval> {
        let started = Instant::now();
        let language = detect_or_default(self.detector.as_ref(), question);
        metrics::record_stage("detect", started.elapsed());

        let started = Instant::now();
        let hits = self.search.search(question, self.top_k()).await;
        metrics::record_stage("search", started.elapsed());
        let hits = hits?;
        metrics::record_graph_hits(hits.len());

        let bundle = self.assembler.assemble(&hits);
        debug!(
            language = %language,
            hits = hits.len(),
            graph_context = bundle.has_graph_context(),
            "Retrieved graph context"
        );

        Ok(Retrieval { language, bundle })
    }

    async fn prepare(&self, conversation: &Conversation, question: &str) -> Result<PreparedTurn> {
        let Retrieval { language, bundle } = self.retrieve(question).await?;
        let effective_language = conversation.resolve_effective_language(language);

        Ok(PreparedTurn {
            language,
            effective_language,
            bundle,
            history: conversation.history_with(question),
        })
    }

    /// Answer a question and record the turn.
    ///
    /// On any failure the conversation is left unchanged.
    pub async fn handle_question(
        &self,
        conversation: &SharedConversation,
        question: &str,
    ) -> Result<TurnOutcome> {
        let _inflight = metrics::TurnGuard::start();
        let mut conversation = conversation.lock().await;

        let prepared = match self.prepare(&conversation, question).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("Turn aborted during retrieval: {}", err);
                metrics::record_turn("error");
                return Err(err);
            }
        };

        let started = Instant::now();
        let answer = self
            .answerer
            .generate(
                &prepared.history,
                &prepared.bundle.context_text,
                prepared.effective_language,
            )
            .await;
        metrics::record_stage("answer", started.elapsed());

        let answer = match answer {
            Ok(answer) => answer,
            Err(err) => {
                warn!("Turn aborted during answer generation: {}", err);
                metrics::record_turn("error");
                return Err(err);
            }
        };

        let outcome = commit(&mut conversation, question, prepared, answer, self.policy);
        metrics::record_turn("ok");
        Ok(outcome)
    }

    /// Start a streamed turn. The conversation stays locked until the
    /// returned [`PendingTurn`] is finished or dropped.
    pub async fn stream_question(
        &self,
        conversation: &SharedConversation,
        question: &str,
    ) -> Result<PendingTurn> {
        let inflight = metrics::TurnGuard::start();
        let conversation = conversation.clone().lock_owned().await;

        let prepared = match self.prepare(&conversation, question).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("Turn aborted during retrieval: {}", err);
                metrics::record_turn("error");
                return Err(err);
            }
        };

        let started = Instant::now();
        let stream = match self
            .answerer
            .generate_stream(
                &prepared.history,
                &prepared.bundle.context_text,
                prepared.effective_language,
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Turn aborted before streaming: {}", err);
                metrics::record_stage("answer", started.elapsed());
                metrics::record_turn("error");
                return Err(err);
            }
        };

        Ok(PendingTurn {
            conversation,
            question: question.to_string(),
            prepared: Some(prepared),
            policy: self.policy,
            stream,
            answer: String::new(),
            state: StreamState::Streaming,
            outcome: None,
            started,
            _inflight: inflight,
        })
    }
}

fn commit(
    conversation: &mut Conversation,
    question: &str,
    prepared: PreparedTurn,
    answer: String,
    policy: BundlePolicy,
) -> TurnOutcome {
    let stored = policy.select(&answer, prepared.bundle);
    conversation.append_turn(question, prepared.language, answer.clone(), stored.clone());

    info!(
        conversation = %conversation.title(),
        turns = conversation.turn_count(),
        language = %prepared.language,
        effective_language = %prepared.effective_language,
        answer_len = answer.len(),
        entities = stored.graph.entities.len(),
        "Turn recorded"
    );

    TurnOutcome {
        question: question.to_string(),
        answer,
        language: prepared.language,
        effective_language: prepared.effective_language,
        bundle: stored,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Committed,
    Failed,
}

/// A turn whose answer is still streaming.
///
/// The turn is recorded only after the stream is drained. Dropping it early,
/// or a stream error, abandons the turn without touching the conversation.
pub struct PendingTurn {
    conversation: OwnedMutexGuard<Conversation>,
    question: String,
    prepared: Option<PreparedTurn>,
    policy: BundlePolicy,
    stream: AnswerStream,
    answer: String,
    state: StreamState,
    outcome: Option<TurnOutcome>,
    started: Instant,
    _inflight: metrics::TurnGuard,
}

impl PendingTurn {
    /// Bundle computed for this question.
    pub fn bundle(&self) -> Option<&ContextBundle> {
        self.prepared
            .as_ref()
            .map(|p| &p.bundle)
            .or_else(|| self.outcome.as_ref().map(|o| &o.bundle))
    }

    pub fn effective_language(&self) -> Option<Language> {
        self.prepared
            .as_ref()
            .map(|p| p.effective_language)
            .or_else(|| self.outcome.as_ref().map(|o| o.effective_language))
    }

    /// Text received so far.
    pub fn partial_answer(&self) -> &str {
        &self.answer
    }

    /// Next chunk, or `None` once the answer is complete and recorded.
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.state != StreamState::Streaming {
            return Ok(None);
        }

        match self.stream.next().await {
            Some(Ok(chunk)) => {
                self.answer.push_str(&chunk);
                Ok(Some(chunk))
            }
            Some(Err(err)) => {
                warn!("Answer stream failed, discarding partial answer: {}", err);
                self.state = StreamState::Failed;
                self.answer.clear();
                metrics::record_stage("answer", self.started.elapsed());
                metrics::record_turn("error");
                Err(err)
            }
            None => {
                metrics::record_stage("answer", self.started.elapsed());
                if let Some(prepared) = self.prepared.take() {
                    let answer = std::mem::take(&mut self.answer);
                    self.outcome = Some(commit(
                        &mut self.conversation,
                        &self.question,
                        prepared,
                        answer,
                        self.policy,
                    ));
                }
                self.state = StreamState::Committed;
                metrics::record_turn("ok");
                Ok(None)
            }
        }
    }

    /// Drain the rest of the stream and return the recorded turn.
    pub async fn finish(mut self) -> Result<TurnOutcome> {
        while self.next_chunk().await?.is_some() {}

        self.outcome.take().ok_or_else(|| {
            Error::Answerer("answer stream failed; turn was not recorded".to_string())
        })
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        if self.state == StreamState::Streaming {
            info!(
                received = self.answer.len(),
                "Streamed turn cancelled before completion; nothing recorded"
            );
            metrics::record_turn("cancelled");
        }
    }
}
