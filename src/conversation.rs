//! Multi-turn conversation state.
//!
//! A [`Conversation`] keeps its message log and the context bundle of every
//! question/answer pair side by side: bundle `k` belongs to the `k`-th
//! (user, assistant) pair. Both only grow through [`Conversation::append_turn`].
//!
//! The [`ConversationRegistry`] owns all conversations of a process and
//! tracks which one is current. Each conversation sits behind its own async
//! mutex so a turn can hold it for the whole answer generation.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::graph::ContextBundle;
use crate::language::Language;
use crate::{Error, Result};

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat message. Only user messages carry a detected language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl Message {
    pub fn user(content: impl Into<String>, language: Option<Language>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            language,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            language: None,
        }
    }
}

/// An independent chat thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
    bundles: Vec<ContextBundle>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
            bundles: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn bundles(&self) -> &[ContextBundle] {
        &self.bundles
    }

    /// Number of completed question/answer pairs.
    pub fn turn_count(&self) -> usize {
        self.bundles.len()
    }

    /// Bundle of the most recent turn (what the graph panel shows).
    pub fn latest_bundle(&self) -> Option<&ContextBundle> {
        self.bundles.last()
    }

    /// Iterate over completed turns as (question, answer, bundle).
    pub fn turns(&self) -> impl Iterator<Item = (&Message, &Message, &ContextBundle)> {
        self.messages
            .chunks_exact(2)
            .zip(self.bundles.iter())
            .map(|(pair, bundle)| (&pair[0], &pair[1], bundle))
    }

    /// Record a completed turn: question, answer and bundle land together.
    pub fn append_turn(
        &mut self,
        user_text: impl Into<String>,
        user_lang: Language,
        assistant_text: impl Into<String>,
        bundle: ContextBundle,
    ) {
        self.messages.reserve(2);
        self.messages.push(Message::user(user_text, Some(user_lang)));
        self.messages.push(Message::assistant(assistant_text));
        self.bundles.push(bundle);
    }

    /// Language of the newest user message that has one, else `fallback`.
    pub fn resolve_effective_language(&self, fallback: Language) -> Language {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| m.language)
            .unwrap_or(fallback)
    }

    /// History plus a not-yet-persisted question, as sent to the answerer.
    pub fn history_with(&self, question: &str) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.messages.len() + 1);
        history.extend_from_slice(&self.messages);
        history.push(Message::user(question, None));
        history
    }

    /// Check the message/bundle alignment of a deserialized conversation.
    pub fn validate(&self) -> Result<()> {
        if self.messages.len() != self.bundles.len() * 2 {
            return Err(Error::SerializationError(format!(
                "conversation '{}' has {} messages for {} bundles",
                self.title,
                self.messages.len(),
                self.bundles.len()
            )));
        }
        for (idx, pair) in self.messages.chunks_exact(2).enumerate() {
            if pair[0].role != Role::User || pair[1].role != Role::Assistant {
                return Err(Error::SerializationError(format!(
                    "conversation '{}' turn {} is not a user/assistant pair",
                    self.title, idx
                )));
            }
        }
        Ok(())
    }
}

/// Conversation shared between the registry and in-flight turns.
pub type SharedConversation = Arc<Mutex<Conversation>>;

/// Listing entry for the conversation picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub index: usize,
    pub title: String,
    pub turns: usize,
    pub is_current: bool,
}

struct RegistryState {
    conversations: Vec<SharedConversation>,
    current: usize,
}

/// All conversations of the process; exactly one is current.
pub struct ConversationRegistry {
    state: RwLock<RegistryState>,
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationRegistry {
    /// Registry holding a single empty "Conversation 1".
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                conversations: vec![Arc::new(Mutex::new(Conversation::new(default_title(0))))],
                current: 0,
            }),
        }
    }

    /// Registry from existing conversations (e.g. a loaded snapshot).
    /// An empty list starts a fresh "Conversation 1".
    pub fn with_conversations(conversations: Vec<Conversation>, current: usize) -> Result<Self> {
        let mut conversations = conversations;
        if conversations.is_empty() {
            conversations.push(Conversation::new(default_title(0)));
        }
        if current >= conversations.len() {
            return Err(Error::IndexOutOfRange {
                index: current,
                len: conversations.len(),
            });
        }

        Ok(Self {
            state: RwLock::new(RegistryState {
                conversations: conversations
                    .into_iter()
                    .map(|c| Arc::new(Mutex::new(c)))
                    .collect(),
                current,
            }),
        })
    }

    /// Append a new empty conversation and make it current.
    pub fn create_conversation(&self, title: Option<&str>) -> (usize, SharedConversation) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let index = state.conversations.len();
        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| default_title(index));

        info!(index, title = %title, "Started new conversation");
        let conversation = Arc::new(Mutex::new(Conversation::new(title)));
        state.conversations.push(conversation.clone());
        state.current = index;
        (index, conversation)
    }

    /// Switch the current conversation. Out-of-range leaves it unchanged.
    pub fn select_conversation(&self, index: usize) -> Result<SharedConversation> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let conversation = state
            .conversations
            .get(index)
            .cloned()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: state.conversations.len(),
            })?;
        state.current = index;
        Ok(conversation)
    }

    pub fn get(&self, index: usize) -> Result<SharedConversation> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .conversations
            .get(index)
            .cloned()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: state.conversations.len(),
            })
    }

    pub fn current(&self) -> SharedConversation {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.conversations[state.current].clone()
    }

    pub fn current_index(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .conversations
            .len()
    }

    /// Always false: a registry holds at least one conversation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handles(&self) -> (Vec<SharedConversation>, usize) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.conversations.clone(), state.current)
    }

    /// Titles and turn counts. Waits for in-flight turns to finish.
    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        let (handles, current) = self.handles();
        let mut summaries = Vec::with_capacity(handles.len());
        for (index, handle) in handles.iter().enumerate() {
            let conversation = handle.lock().await;
            summaries.push(ConversationSummary {
                index,
                title: conversation.title().to_string(),
                turns: conversation.turn_count(),
                is_current: index == current,
            });
        }
        summaries
    }

    /// Copy of every conversation and the current index.
    pub async fn snapshot(&self) -> (Vec<Conversation>, usize) {
        let (handles, current) = self.handles();
        let mut conversations = Vec::with_capacity(handles.len());
        for handle in &handles {
            conversations.push(handle.lock().await.clone());
        }
        (conversations, current)
    }
}

fn default_title(index: usize) -> String {
    format!("Conversation {}", index + 1)
}
