//! Context assembly: ranked hits → text context, graph, entity table, query.
//!
//! The same pass over the hits materializes four views that must stay
//! consistent with each other:
//! - `context_text` handed to the language model
//! - a deduplicated [`FaultGraph`] for visualization
//! - a deduplicated entity table (kind + remarks)
//! - a Cypher query that replays the graph in a Neo4j browser

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{
    Entity, EntityKind, EntityType, FaultGraph, Hit, HitMetadata, Relation, RelationType,
};

/// Context text used when no hit contributed anything.
pub const NO_GRAPH_CONTEXT: &str =
    "(No direct graph context found; relying on general knowledge.)";

/// Default number of hits taken into the context.
pub const DEFAULT_TOP_K: usize = 5;

/// One row of the flat entity table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTableRow {
    pub entity_kind: EntityKind,
    pub remarks: String,
}

/// Everything retrieved for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub context_text: String,
    pub graph: FaultGraph,
    pub entity_table: Vec<EntityTableRow>,
    pub query_text: String,
}

impl Default for ContextBundle {
    fn default() -> Self {
        Self::empty()
    }
}

impl ContextBundle {
    /// Bundle with no graph content and the fallback context text.
    pub fn empty() -> Self {
        Self {
            context_text: NO_GRAPH_CONTEXT.to_string(),
            graph: FaultGraph::default(),
            entity_table: Vec::new(),
            query_text: String::new(),
        }
    }

    /// True if any hit contributed to this bundle.
    pub fn has_graph_context(&self) -> bool {
        self.context_text != NO_GRAPH_CONTEXT
    }
}

/// Builds [`ContextBundle`]s from ranked hits.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    top_k: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl ContextAssembler {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Assemble a bundle from hits in rank order. Never fails: hits without
    /// metadata and incomplete id/label pairs are skipped.
    pub fn assemble(&self, hits: &[Hit]) -> ContextBundle {
        let mut state = AssemblyState::default();

        for meta in hits
            .iter()
            .take(self.top_k)
            .filter_map(|hit| hit.metadata.as_ref())
        {
            state.add(meta);
        }

        let bundle = state.finish();
        debug!(
            hits = hits.len().min(self.top_k),
            entities = bundle.graph.entities.len(),
            relations = bundle.graph.relations.len(),
            table_rows = bundle.entity_table.len(),
            "Assembled graph context"
        );
        bundle
    }
}

#[derive(Default)]
struct AssemblyState {
    entities: Vec<Entity>,
    entity_index: HashMap<String, usize>,
    relations: Vec<Relation>,
    seen_relations: HashSet<Relation>,
    context: String,
    table: Vec<EntityTableRow>,
    seen_rows: HashSet<(EntityKind, String)>,
}

impl AssemblyState {
    fn add(&mut self, meta: &HitMetadata) {
        for entity_type in EntityType::ALL {
            if let Some(entity) = meta.entity(entity_type) {
                self.upsert_entity(entity);
            }
        }

        for relation_type in RelationType::ALL {
            let (source, target) = relation_type.endpoints();
            if let (Some(source), Some(target)) = (meta.entity(source), meta.entity(target)) {
                self.push_relation(Relation {
                    source: source.id,
                    target: target.id,
                    relation_type,
                });
            }
        }

        let mut snippet = String::new();
        for entity_type in EntityType::ALL {
            let Some(value) = meta.label(entity_type) else {
                continue;
            };
            snippet.push_str(entity_type.field_name());
            snippet.push_str(": ");
            snippet.push_str(value);
            snippet.push('\n');

            let key = (entity_type.kind(), value.to_string());
            if !self.seen_rows.contains(&key) {
                self.table.push(EntityTableRow {
                    entity_kind: key.0,
                    remarks: key.1.clone(),
                });
                self.seen_rows.insert(key);
            }
        }

        if !snippet.is_empty() {
            self.context.push_str(&snippet);
            self.context.push('\n');
        }
    }

    // Last-seen label wins, first-insertion position is kept.
    fn upsert_entity(&mut self, entity: Entity) {
        match self.entity_index.get(&entity.id) {
            Some(&idx) => self.entities[idx] = entity,
            None => {
                self.entity_index.insert(entity.id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    fn push_relation(&mut self, relation: Relation) {
        if self.seen_relations.insert(relation.clone()) {
            self.relations.push(relation);
        }
    }

    fn finish(self) -> ContextBundle {
        let context_text = if self.context.is_empty() {
            NO_GRAPH_CONTEXT.to_string()
        } else {
            self.context
        };
        let ids: Vec<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        let query_text = replay_query(&ids);

        ContextBundle {
            context_text,
            query_text,
            graph: FaultGraph {
                entities: self.entities,
                relations: self.relations,
            },
            entity_table: self.table,
        }
    }
}

/// Cypher query returning the given nodes and the edges between them.
/// Returns an empty string when there are no ids.
pub fn replay_query(ids: &[&str]) -> String {
    if ids.is_empty() {
        return String::new();
    }

    let quoted: Vec<String> = ids
        .iter()
        .map(|id| serde_json::Value::from(*id).to_string())
        .collect();
    let list = quoted.join(", ");

    format!(
        "MATCH (n)\nWHERE elementId(n) IN [{list}]\nOPTIONAL MATCH (n)-[r]->(m)\nWHERE elementId(m) IN [{list}]\nRETURN n, r, m"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> HitMetadata {
        let mut meta = HitMetadata::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "location" => meta.location = value,
                "location_id" => meta.location_id = value,
                "symptom" => meta.symptom = value,
                "symptom_id" => meta.symptom_id = value,
                "reason" => meta.reason = value,
                "reason_id" => meta.reason_id = value,
                "measure" => meta.measure = value,
                "measure_id" => meta.measure_id = value,
                other => panic!("unknown field {other}"),
            }
        }
        meta
    }

    fn full_chain(suffix: &str) -> Hit {
        Hit::new(
            0.9,
            meta(&[
                ("location", "Pump A"),
                ("location_id", "L1"),
                ("symptom", "Leak"),
                ("symptom_id", "S1"),
                ("reason", &format!("Worn seal {suffix}")),
                ("reason_id", &format!("R{suffix}")),
                ("measure", "Replace seal"),
                ("measure_id", "M1"),
            ]),
        )
    }

    #[test]
    fn single_location_symptom_hit() {
        let hits = vec![Hit::new(
            1.0,
            meta(&[
                ("location", "Pump A"),
                ("location_id", "L1"),
                ("symptom", "Leak"),
                ("symptom_id", "S1"),
            ]),
        )];

        let bundle = ContextAssembler::default().assemble(&hits);

        assert_eq!(bundle.context_text, "Location: Pump A\nSymptom: Leak\n\n");
        assert_eq!(
            bundle.graph.entities,
            vec![
                Entity {
                    id: "L1".to_string(),
                    label: "Pump A".to_string(),
                    entity_type: EntityType::Location,
                },
                Entity {
                    id: "S1".to_string(),
                    label: "Leak".to_string(),
                    entity_type: EntityType::Symptom,
                },
            ]
        );
        assert_eq!(
            bundle.graph.relations,
            vec![Relation {
                source: "L1".to_string(),
                target: "S1".to_string(),
                relation_type: RelationType::HasFault,
            }]
        );
        assert!(bundle.query_text.contains(r#"IN ["L1", "S1"]"#));
    }

    #[test]
    fn no_hits_yields_sentinel() {
        let bundle = ContextAssembler::default().assemble(&[]);
        assert_eq!(bundle.context_text, NO_GRAPH_CONTEXT);
        assert!(bundle.graph.entities.is_empty());
        assert!(bundle.query_text.is_empty());
        assert!(!bundle.has_graph_context());
    }

    #[test]
    fn blank_metadata_yields_sentinel() {
        let hits = vec![Hit::empty(0.5), Hit::new(0.4, HitMetadata::default())];
        let bundle = ContextAssembler::default().assemble(&hits);
        assert_eq!(bundle.context_text, NO_GRAPH_CONTEXT);
        assert!(bundle.graph.is_empty());
        assert_eq!(bundle, ContextBundle::empty());
    }

    #[test]
    fn duplicate_location_gives_one_table_row() {
        let location = meta(&[("location", "Pump A"), ("location_id", "L1")]);
        let hits = vec![Hit::new(0.9, location.clone()), Hit::new(0.8, location)];

        let bundle = ContextAssembler::default().assemble(&hits);

        let rows: Vec<_> = bundle
            .entity_table
            .iter()
            .filter(|row| row.entity_kind == EntityKind::FaultLocation && row.remarks == "Pump A")
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(bundle.graph.entities.len(), 1);
        assert_eq!(bundle.context_text, "Location: Pump A\n\nLocation: Pump A\n\n");
    }

    #[test]
    fn entities_deduplicate_by_id_with_last_label() {
        let hits = vec![
            Hit::new(0.9, meta(&[("location", "Pump A"), ("location_id", "L1")])),
            Hit::new(0.8, meta(&[("symptom", "Leak"), ("symptom_id", "S1")])),
            Hit::new(0.7, meta(&[("location", "Pump A (north)"), ("location_id", "L1")])),
        ];

        let bundle = ContextAssembler::default().assemble(&hits);
        let entities = &bundle.graph.entities;

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "L1");
        assert_eq!(entities[0].label, "Pump A (north)");
        assert_eq!(entities[1].id, "S1");
    }

    #[test]
    fn relations_need_both_endpoints() {
        let hits = vec![Hit::new(
            0.9,
            meta(&[
                ("location_id", "L1"),
                ("symptom", "Leak"),
                ("symptom_id", "S1"),
                ("measure", "Tighten flange"),
                ("measure_id", "M1"),
            ]),
        )];

        let bundle = ContextAssembler::default().assemble(&hits);

        assert_eq!(
            bundle.graph.relations,
            vec![Relation {
                source: "S1".to_string(),
                target: "M1".to_string(),
                relation_type: RelationType::MitigatedBy,
            }]
        );
    }

    #[test]
    fn repeated_edges_are_emitted_once() {
        let hits = vec![full_chain("1"), full_chain("2")];
        let bundle = ContextAssembler::default().assemble(&hits);

        let has_fault = bundle
            .graph
            .relations
            .iter()
            .filter(|r| r.relation_type == RelationType::HasFault)
            .count();
        let caused_by = bundle
            .graph
            .relations
            .iter()
            .filter(|r| r.relation_type == RelationType::CausedBy)
            .count();

        assert_eq!(has_fault, 1);
        assert_eq!(caused_by, 2);
        assert_eq!(bundle.graph.relations.len(), 4);
    }

    #[test]
    fn fields_without_id_still_reach_context_and_table() {
        let hits = vec![Hit::new(0.9, meta(&[("reason", "Cavitation")]))];
        let bundle = ContextAssembler::default().assemble(&hits);

        assert_eq!(bundle.context_text, "Reason: Cavitation\n\n");
        assert!(bundle.graph.entities.is_empty());
        assert!(bundle.query_text.is_empty());
        assert_eq!(
            bundle.entity_table,
            vec![EntityTableRow {
                entity_kind: EntityKind::FaultReason,
                remarks: "Cavitation".to_string(),
            }]
        );
    }

    #[test]
    fn assembly_is_repeatable() {
        let hits = vec![full_chain("1"), Hit::empty(0.1), full_chain("2")];
        let assembler = ContextAssembler::new(3);

        assert_eq!(assembler.assemble(&hits), assembler.assemble(&hits));
    }

    #[test]
    fn top_k_caps_the_hits_used() {
        let hits = vec![
            Hit::new(0.9, meta(&[("location", "Pump A"), ("location_id", "L1")])),
            Hit::new(0.8, meta(&[("location", "Pump B"), ("location_id", "L2")])),
            Hit::new(0.7, meta(&[("location", "Pump C"), ("location_id", "L3")])),
        ];

        let bundle = ContextAssembler::new(2).assemble(&hits);
        assert_eq!(bundle.graph.entities.len(), 2);
        assert!(!bundle.context_text.contains("Pump C"));
    }

    #[test]
    fn replay_query_shape() {
        let query = replay_query(&["4:ab:1", "4:ab:2"]);
        assert_eq!(
            query,
            "MATCH (n)\n\
             WHERE elementId(n) IN [\"4:ab:1\", \"4:ab:2\"]\n\
             OPTIONAL MATCH (n)-[r]->(m)\n\
             WHERE elementId(m) IN [\"4:ab:1\", \"4:ab:2\"]\n\
             RETURN n, r, m"
        );
        assert!(replay_query(&[]).is_empty());
    }

    #[test]
    fn replay_query_escapes_quotes() {
        let query = replay_query(&["a\"b"]);
        assert!(query.contains(r#"["a\"b"]"#));
    }
}
