//! Data types shared by the search, assembly and rendering stages.

use serde::{Deserialize, Serialize};

/// One scored result from the graph search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub score: f64,
    #[serde(default)]
    pub metadata: Option<HitMetadata>,
}

impl Hit {
    pub fn new(score: f64, metadata: HitMetadata) -> Self {
        Self {
            score,
            metadata: Some(metadata),
        }
    }

    /// A hit carrying no fault chain (skipped during assembly).
    pub fn empty(score: f64) -> Self {
        Self {
            score,
            metadata: None,
        }
    }
}

/// Location → symptom → reason → measure chain attached to a hit.
///
/// Every label is paired with the element id of its node. A pair is only
/// usable as a graph node when both halves are non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitMetadata {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub symptom: Option<String>,
    #[serde(default)]
    pub symptom_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reason_id: Option<String>,
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub measure_id: Option<String>,
}

impl HitMetadata {
    /// Non-empty label for an entity type.
    pub fn label(&self, entity_type: EntityType) -> Option<&str> {
        let value = match entity_type {
            EntityType::Location => &self.location,
            EntityType::Symptom => &self.symptom,
            EntityType::Reason => &self.reason,
            EntityType::Measure => &self.measure,
        };
        non_empty(value)
    }

    /// Non-empty element id for an entity type.
    pub fn id(&self, entity_type: EntityType) -> Option<&str> {
        let value = match entity_type {
            EntityType::Location => &self.location_id,
            EntityType::Symptom => &self.symptom_id,
            EntityType::Reason => &self.reason_id,
            EntityType::Measure => &self.measure_id,
        };
        non_empty(value)
    }

    /// The node for an entity type, if id and label are both present.
    pub fn entity(&self, entity_type: EntityType) -> Option<Entity> {
        match (self.id(entity_type), self.label(entity_type)) {
            (Some(id), Some(label)) => Some(Entity {
                id: id.to_string(),
                label: label.to_string(),
                entity_type,
            }),
            _ => None,
        }
    }

    /// True when no label is set at all.
    pub fn is_blank(&self) -> bool {
        EntityType::ALL.iter().all(|t| self.label(*t).is_none())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Kind of fault node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Location,
    Symptom,
    Reason,
    Measure,
}

impl EntityType {
    /// Fixed order used for context lines and table rows.
    pub const ALL: [EntityType; 4] = [
        EntityType::Location,
        EntityType::Symptom,
        EntityType::Reason,
        EntityType::Measure,
    ];

    /// Field name used in the language-model context.
    pub fn field_name(&self) -> &'static str {
        match self {
            EntityType::Location => "Location",
            EntityType::Symptom => "Symptom",
            EntityType::Reason => "Reason",
            EntityType::Measure => "Measure",
        }
    }

    /// Node label in the graph database.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityType::Location => EntityKind::FaultLocation,
            EntityType::Symptom => EntityKind::FaultSymptom,
            EntityType::Reason => EntityKind::FaultReason,
            EntityType::Measure => EntityKind::FaultMeasure,
        }
    }
}

/// Graph database label of an entity, as shown in the entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    FaultLocation,
    FaultSymptom,
    FaultReason,
    FaultMeasure,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::FaultLocation => "FaultLocation",
            EntityKind::FaultSymptom => "FaultSymptom",
            EntityKind::FaultReason => "FaultReason",
            EntityKind::FaultMeasure => "FaultMeasure",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

/// Relationship types between fault nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// location → symptom
    HasFault,
    /// symptom → reason
    CausedBy,
    /// symptom → measure
    MitigatedBy,
}

impl RelationType {
    pub const ALL: [RelationType; 3] = [
        RelationType::HasFault,
        RelationType::CausedBy,
        RelationType::MitigatedBy,
    ];

    /// Endpoint types as (source, target).
    pub fn endpoints(&self) -> (EntityType, EntityType) {
        match self {
            RelationType::HasFault => (EntityType::Location, EntityType::Symptom),
            RelationType::CausedBy => (EntityType::Symptom, EntityType::Reason),
            RelationType::MitigatedBy => (EntityType::Symptom, EntityType::Measure),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::HasFault => "HAS_FAULT",
            RelationType::CausedBy => "CAUSED_BY",
            RelationType::MitigatedBy => "MITIGATED_BY",
        }
    }
}

/// A directed, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
}

/// Rendered graph payload: `{nodes: [...], links: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultGraph {
    #[serde(rename = "nodes")]
    pub entities: Vec<Entity>,
    #[serde(rename = "links")]
    pub relations: Vec<Relation>,
}

impl FaultGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// JSON payload for a visualization panel.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
