//! Relation model for the entity graph.
//!
//! A relation is a typed edge between two entities. It is stored once,
//! source -> target; a bidirectional relation is additionally visible from
//! the target side under its reverse type without a second row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::{EntityKind, EntityRef, Record};

// ============================================================================
// Relation Type
// ============================================================================

/// Type of relationship between two entities, from the source's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RelationType {
    ParentChild,
    Blocks,
    BlockedBy,
    RelatedTo,
    DuplicateOf,
    DependsOn,
    RequiredBy,
    SubtaskOf,
    Linked,
    /// Provenance marker, one-way
    ClonedFrom,
    /// Provenance marker, one-way
    MovedFrom,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::ParentChild => "parent_child",
            RelationType::Blocks => "blocks",
            RelationType::BlockedBy => "blocked_by",
            RelationType::RelatedTo => "related_to",
            RelationType::DuplicateOf => "duplicate_of",
            RelationType::DependsOn => "depends_on",
            RelationType::RequiredBy => "required_by",
            RelationType::SubtaskOf => "subtask_of",
            RelationType::Linked => "linked",
            RelationType::ClonedFrom => "cloned_from",
            RelationType::MovedFrom => "moved_from",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parent_child" => Some(RelationType::ParentChild),
            "blocks" => Some(RelationType::Blocks),
            "blocked_by" => Some(RelationType::BlockedBy),
            "related_to" => Some(RelationType::RelatedTo),
            "duplicate_of" => Some(RelationType::DuplicateOf),
            "depends_on" => Some(RelationType::DependsOn),
            "required_by" => Some(RelationType::RequiredBy),
            "subtask_of" => Some(RelationType::SubtaskOf),
            "linked" => Some(RelationType::Linked),
            "cloned_from" => Some(RelationType::ClonedFrom),
            "moved_from" => Some(RelationType::MovedFrom),
            _ => None,
        }
    }

    /// Get all relation types
    pub fn all() -> &'static [RelationType] {
        &[
            RelationType::ParentChild,
            RelationType::Blocks,
            RelationType::BlockedBy,
            RelationType::RelatedTo,
            RelationType::DuplicateOf,
            RelationType::DependsOn,
            RelationType::RequiredBy,
            RelationType::SubtaskOf,
            RelationType::Linked,
            RelationType::ClonedFrom,
            RelationType::MovedFrom,
        ]
    }

    /// Canonical type of the same edge read from the target's side.
    ///
    /// `None` for the provenance markers, which have no reverse reading.
    pub fn reverse(&self) -> Option<RelationType> {
        match self {
            RelationType::Blocks => Some(RelationType::BlockedBy),
            RelationType::BlockedBy => Some(RelationType::Blocks),
            RelationType::DependsOn => Some(RelationType::RequiredBy),
            RelationType::RequiredBy => Some(RelationType::DependsOn),
            RelationType::SubtaskOf => Some(RelationType::ParentChild),
            RelationType::ParentChild
            | RelationType::RelatedTo
            | RelationType::DuplicateOf
            | RelationType::Linked => Some(*self),
            RelationType::ClonedFrom | RelationType::MovedFrom => None,
        }
    }

    /// Whether the type reads the same from both ends.
    pub fn is_symmetric(&self) -> bool {
        self.reverse() == Some(*self)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Relation
// ============================================================================

/// Free-form presentation metadata attached to a relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

/// A stored edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub source: EntityRef,
    pub target: EntityRef,
    pub relation_type: RelationType,
    pub is_bidirectional: bool,
    /// Derived from `relation_type` when bidirectional
    pub reverse_relation_type: Option<RelationType>,
    pub created_by: i64,
    pub metadata: RelationMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    /// The endpoint that is not `entity`.
    pub fn other_end(&self, entity: &EntityRef) -> EntityRef {
        if self.source == *entity {
            self.target
        } else {
            self.source
        }
    }

    /// The type as read from `entity`'s side of the edge.
    pub fn type_from(&self, entity: &EntityRef) -> Option<RelationType> {
        if self.source == *entity {
            Some(self.relation_type)
        } else if self.is_bidirectional {
            self.reverse_relation_type
        } else {
            None
        }
    }
}

/// Flat row shape of `entity_relations`.
#[derive(Debug, Clone, FromRow)]
pub struct RelationRow {
    pub id: i64,
    pub source_type: EntityKind,
    pub source_id: i64,
    pub target_type: EntityKind,
    pub target_id: i64,
    pub relation_type: RelationType,
    pub is_bidirectional: bool,
    pub reverse_relation_type: Option<RelationType>,
    pub created_by: i64,
    pub metadata: Json<RelationMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RelationRow> for Relation {
    fn from(row: RelationRow) -> Self {
        Self {
            id: row.id,
            source: EntityRef::new(row.source_type, row.source_id),
            target: EntityRef::new(row.target_type, row.target_id),
            relation_type: row.relation_type,
            is_bidirectional: row.is_bidirectional,
            reverse_relation_type: row.reverse_relation_type,
            created_by: row.created_by,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Relations touching an entity, split by direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationsView {
    /// Relations where the entity is the source
    pub outgoing: Vec<Relation>,
    /// Bidirectional relations where the entity is the target
    pub incoming: Vec<Relation>,
}

/// A relation paired with its resolved target entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub relation: Relation,
    pub entity: Record,
}

/// Result of an idempotent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub relation_id: i64,
    /// False when an equivalent relation already existed
    pub created: bool,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request model for creating or linking a relation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationRequest {
    pub source_type: EntityKind,
    pub source_id: i64,
    pub target_type: EntityKind,
    pub target_id: i64,
    pub relation_type: RelationType,
    #[serde(default)]
    pub is_bidirectional: bool,
    #[serde(default)]
    pub metadata: RelationMetadata,
}

impl CreateRelationRequest {
    pub fn source(&self) -> EntityRef {
        EntityRef::new(self.source_type, self.source_id)
    }

    pub fn target(&self) -> EntityRef {
        EntityRef::new(self.target_type, self.target_id)
    }
}

/// Request model for removing relations between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlinkRequest {
    pub source_type: EntityKind,
    pub source_id: i64,
    pub target_type: EntityKind,
    pub target_id: i64,
    #[serde(default)]
    pub relation_type: Option<RelationType>,
}
