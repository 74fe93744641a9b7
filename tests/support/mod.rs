//! In-process stand-ins for the detector, graph search and answerer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Barrier;

use fault_graph_assistant::error::{Error, Result};
use fault_graph_assistant::integrations::AnswerStream;
use fault_graph_assistant::{
    Answerer, GraphSearch, Hit, HitMetadata, Language, LanguageDetector, Message, Orchestrator,
};

/// Dutch when the text contains a Dutch keyword, English otherwise.
pub struct KeywordDetector;

impl LanguageDetector for KeywordDetector {
    fn detect(&self, text: &str) -> Result<Language> {
        let lower = text.to_lowercase();
        let dutch = ["waarom", "lekt", "pomp", "hoe "];
        Ok(if dutch.iter().any(|w| lower.contains(w)) {
            Language::Dutch
        } else {
            Language::English
        })
    }
}

/// Returns the same hits for every query.
#[derive(Default)]
pub struct StaticSearch {
    pub hits: Vec<Hit>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub top_ks: Mutex<Vec<usize>>,
}

impl StaticSearch {
    pub fn with_hits(hits: Vec<Hit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphSearch for StaticSearch {
    async fn search(&self, _query_text: &str, top_k: usize) -> Result<Vec<Hit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.top_ks.lock().unwrap().push(top_k);
        if self.fail {
            return Err(Error::GraphSearch("graph unavailable".to_string()));
        }
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// How the scripted answerer behaves.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    /// Answer immediately.
    Immediate,
    /// Fail the call.
    Fail,
    /// Stream two chunks, then error.
    BrokenStream,
    /// Stream one chunk, then never finish.
    Stalled,
}

/// Records every call and answers with a fixed prefix.
pub struct ScriptedAnswerer {
    pub prefix: String,
    pub mode: AnswerMode,
    pub calls: AtomicUsize,
    pub languages: Mutex<Vec<Language>>,
    pub history_lens: Mutex<Vec<usize>>,
    pub contexts: Mutex<Vec<String>>,
    /// When set, every call waits here before answering.
    pub barrier: Option<Arc<Barrier>>,
}

impl ScriptedAnswerer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            mode: AnswerMode::Immediate,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
            history_lens: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            barrier: None,
        }
    }

    pub fn with_mode(mut self, mode: AnswerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, history: &[Message], graph_context: &str, language: Language) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().unwrap().push(language);
        self.history_lens.lock().unwrap().push(history.len());
        self.contexts.lock().unwrap().push(graph_context.to_string());

        let question = history.last().map(|m| m.content.as_str()).unwrap_or("");
        format!("{} answer ({}) to: {}", self.prefix, language.code(), question)
    }
}

#[async_trait]
impl Answerer for ScriptedAnswerer {
    async fn generate(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<String> {
        let answer = self.record(history, graph_context, language);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        match self.mode {
            AnswerMode::Fail => Err(Error::Answerer("model unavailable".to_string())),
            _ => Ok(answer),
        }
    }

    async fn generate_stream(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<AnswerStream> {
        let answer = self.record(history, graph_context, language);
        let words: Vec<Result<String>> = answer
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();

        Ok(match self.mode {
            AnswerMode::Immediate => stream::iter(words).boxed(),
            AnswerMode::Fail => stream::once(async {
                Err(Error::Answerer("model unavailable".to_string()))
            })
            .boxed(),
            AnswerMode::BrokenStream => stream::iter(words.into_iter().take(2))
                .chain(stream::once(async {
                    Err(Error::Answerer("connection reset".to_string()))
                }))
                .boxed(),
            AnswerMode::Stalled => stream::iter(words.into_iter().take(1))
                .chain(stream::pending())
                .boxed(),
        })
    }
}

pub fn pump_hit() -> Hit {
    Hit::new(
        0.9,
        HitMetadata {
            location: Some("Pump A".to_string()),
            location_id: Some("L1".to_string()),
            symptom: Some("Leak".to_string()),
            symptom_id: Some("S1".to_string()),
            ..Default::default()
        },
    )
}

pub fn full_chain_hit() -> Hit {
    Hit::new(
        0.8,
        HitMetadata {
            location: Some("Pump A".to_string()),
            location_id: Some("L1".to_string()),
            symptom: Some("Leak".to_string()),
            symptom_id: Some("S1".to_string()),
            reason: Some("Worn seal".to_string()),
            reason_id: Some("R1".to_string()),
            measure: Some("Replace seal".to_string()),
            measure_id: Some("M1".to_string()),
        },
    )
}

pub fn orchestrator(
    search: Arc<StaticSearch>,
    answerer: Arc<ScriptedAnswerer>,
) -> Orchestrator {
    Orchestrator::new(Arc::new(KeywordDetector), search, answerer)
}
