//! Knowledge-graph retrieval
//!
//! Provides:
//! - Hybrid search over the Neo4j fault graph
//! - Assembly of ranked hits into a language-model context and a renderable graph

pub mod assembler;
pub mod embeddings;
pub mod models;
pub mod search;

pub use assembler::{ContextAssembler, ContextBundle, EntityTableRow, NO_GRAPH_CONTEXT};
pub use embeddings::EmbeddingService;
pub use models::{
    Entity, EntityKind, EntityType, FaultGraph, Hit, HitMetadata, Relation, RelationType,
};
pub use search::{GraphSearch, Neo4jGraphSearch};
