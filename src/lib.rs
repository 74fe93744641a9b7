//! Fault-Diagnosis Assistant Library
//!
//! This library provides tools to:
//! - Retrieve location → symptom → reason → measure chains from a Neo4j knowledge graph
//! - Assemble them into a language-model context, a renderable graph, an entity table
//!   and a replayable Cypher query
//! - Answer maintenance questions with OpenAI, tagging graph and general knowledge
//! - Keep multiple conversations with per-turn graph context
//! - Export transcripts and persist conversation history

pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod export;
pub mod graph;
pub mod integrations;
pub mod language;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;

// Re-export common types
pub use config::Config;
pub use conversation::{Conversation, ConversationRegistry, Message, Role, SharedConversation};
pub use error::{Error, Result};
pub use graph::{ContextAssembler, ContextBundle, GraphSearch, Hit, HitMetadata};
pub use integrations::{Answerer, OpenAIClient};
pub use language::{Language, LanguageDetector, WhatlangDetector};
pub use orchestrator::{BundlePolicy, Orchestrator, PendingTurn, TurnOutcome};
pub use prompts::{load_prompt, Prompt};
