//! Graph search: the `GraphSearch` seam and its Neo4j implementation.
//!
//! The Neo4j search is hybrid: the query is matched against a vector index
//! and a full-text index, each index's scores are normalized by its best
//! score, and the merged top-k nodes are expanded to their fault chain.

use async_trait::async_trait;
use neo4rs::{query, Graph, Row};
use tracing::{debug, info};

use super::embeddings::EmbeddingService;
use super::models::{Hit, HitMetadata};
use crate::config::Neo4jSettings;
use crate::{Error, Result};

/// Source of ranked hits for a question.
#[async_trait]
pub trait GraphSearch: Send + Sync {
    /// Return at most `top_k` hits, best first.
    async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<Hit>>;
}

/// Merge of vector and full-text candidates, normalized per index.
const HYBRID_CANDIDATES: &str = "CALL {
    CALL db.index.vector.queryNodes($vector_index, $top_k, $query_vector)
    YIELD node, score
    WITH collect({node: node, score: score}) AS nodes, max(score) AS max_score
    UNWIND nodes AS n
    RETURN n.node AS node, (n.score / max_score) AS score
    UNION
    CALL db.index.fulltext.queryNodes($fulltext_index, $query_text, {limit: $top_k})
    YIELD node, score
    WITH collect({node: node, score: score}) AS nodes, max(score) AS max_score
    UNWIND nodes AS n
    RETURN n.node AS node, (n.score / max_score) AS score
}
WITH node, max(score) AS score
ORDER BY score DESC
LIMIT $top_k";

/// Expands a matched node (of any fault label) into its symptom's chain.
const FAULT_CHAIN: &str = "
WITH node, score
OPTIONAL MATCH (node)<-[:CAUSED_BY]-(sym_from_reason:FaultSymptom)
OPTIONAL MATCH (node)<-[:MITIGATED_BY]-(sym_from_measure:FaultSymptom)
OPTIONAL MATCH (node)-[:HAS_FAULT]->(sym_from_loc:FaultSymptom)
WITH node, score,
     CASE
        WHEN sym_from_reason IS NOT NULL THEN sym_from_reason
        WHEN sym_from_measure IS NOT NULL THEN sym_from_measure
        WHEN sym_from_loc IS NOT NULL THEN sym_from_loc
        WHEN node:FaultSymptom THEN node
        ELSE NULL
     END AS symptom,
     node:FaultLocation AS is_location
OPTIONAL MATCH (location:FaultLocation)-[:HAS_FAULT]->(symptom)
OPTIONAL MATCH (symptom)-[:CAUSED_BY]->(reason:FaultReason)
OPTIONAL MATCH (symptom)-[:MITIGATED_BY]->(measure:FaultMeasure)
WITH coalesce(location, CASE WHEN is_location THEN node END) AS location,
     symptom, reason, measure, score
RETURN score,
       location.name AS location,
       elementId(location) AS location_id,
       symptom.description AS symptom,
       elementId(symptom) AS symptom_id,
       reason.name AS reason,
       elementId(reason) AS reason_id,
       measure.description AS measure,
       elementId(measure) AS measure_id";

/// Full hybrid retrieval query.
pub fn hybrid_query() -> String {
    format!("{HYBRID_CANDIDATES}\n{FAULT_CHAIN}")
}

/// Hybrid search over a Neo4j fault graph.
pub struct Neo4jGraphSearch {
    graph: Graph,
    embedder: EmbeddingService,
    vector_index: String,
    fulltext_index: String,
}

impl Neo4jGraphSearch {
    /// Connect to Neo4j server
    pub async fn connect(settings: &Neo4jSettings, embedder: EmbeddingService) -> Result<Self> {
        let graph = Graph::new(&settings.uri, &settings.user, &settings.password).await?;
        info!(uri = %settings.uri, "Connected to Neo4j");

        Ok(Self {
            graph,
            embedder,
            vector_index: settings.vector_index.clone(),
            fulltext_index: settings.fulltext_index.clone(),
        })
    }
}

#[async_trait]
impl GraphSearch for Neo4jGraphSearch {
    async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<Hit>> {
        let vector: Vec<f64> = self
            .embedder
            .embed(query_text)
            .await
            .map_err(|e| Error::GraphSearch(format!("query embedding failed: {e}")))?
            .into_iter()
            .map(f64::from)
            .collect();

        let q = query(&hybrid_query())
            .param("vector_index", self.vector_index.clone())
            .param("fulltext_index", self.fulltext_index.clone())
            .param("query_vector", vector)
            .param("query_text", escape_lucene(query_text))
            .param("top_k", top_k as i64);

        let mut result = self.graph.execute(q).await?;
        let mut hits = Vec::new();

        while let Some(row) = result.next().await? {
            hits.push(hit_from_row(&row));
        }

        debug!(hits = hits.len(), top_k, "Hybrid graph search finished");
        Ok(hits)
    }
}

fn hit_from_row(row: &Row) -> Hit {
    let text = |key: &str| row.get::<String>(key).ok();
    let metadata = HitMetadata {
        location: text("location"),
        location_id: text("location_id"),
        symptom: text("symptom"),
        symptom_id: text("symptom_id"),
        reason: text("reason"),
        reason_id: text("reason_id"),
        measure: text("measure"),
        measure_id: text("measure_id"),
    };

    hit_from_columns(row.get::<f64>("score").unwrap_or(0.0), metadata)
}

/// A row with no chain at all is reported as a hit without metadata.
pub fn hit_from_columns(score: f64, metadata: HitMetadata) -> Hit {
    let has_any_id = [
        &metadata.location_id,
        &metadata.symptom_id,
        &metadata.reason_id,
        &metadata.measure_id,
    ]
    .iter()
    .any(|id| id.is_some());

    if metadata.is_blank() && !has_any_id {
        Hit::empty(score)
    } else {
        Hit::new(score, metadata)
    }
}

/// Escape Lucene query syntax so user text is matched literally.
pub fn escape_lucene(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];

    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
