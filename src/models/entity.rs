//! Entity addressing model.
//!
//! Every relation endpoint and every derived-field anchor is an
//! [`EntityRef`]: a kind from the project hierarchy plus a numeric id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic key/value view of an entity, as returned by the entity store.
///
/// Derived fields address properties of a record by dot-path, so the
/// engines never depend on the concrete row type of a kind.
pub type Record = Map<String, Value>;

// ============================================================================
// Entity Kind
// ============================================================================

/// Level of the project hierarchy an entity belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Block,
    Section,
    Task,
    Subtask,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Block => "block",
            EntityKind::Section => "section",
            EntityKind::Task => "task",
            EntityKind::Subtask => "subtask",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "project" => Some(EntityKind::Project),
            "block" => Some(EntityKind::Block),
            "section" => Some(EntityKind::Section),
            "task" => Some(EntityKind::Task),
            "subtask" => Some(EntityKind::Subtask),
            _ => None,
        }
    }

    /// Get all entity kinds, top of the hierarchy first
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Project,
            EntityKind::Block,
            EntityKind::Section,
            EntityKind::Task,
            EntityKind::Subtask,
        ]
    }

    /// Table holding rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Block => "blocks",
            EntityKind::Section => "sections",
            EntityKind::Task => "tasks",
            EntityKind::Subtask => "subtasks",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Entity Reference
// ============================================================================

/// Immutable address of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn project(id: i64) -> Self {
        Self::new(EntityKind::Project, id)
    }

    pub fn task(id: i64) -> Self {
        Self::new(EntityKind::Task, id)
    }

    pub fn subtask(id: i64) -> Self {
        Self::new(EntityKind::Subtask, id)
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
