//! Relation graph service.
//!
//! Owns the typed edges between entities. Writes raise on failure; reads
//! degrade to an empty result with a warning, so a derived field over an
//! unreachable backend renders as "nothing related" instead of an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::{self, CreateRelation, DbPool};
use crate::models::{
    CreateRelationRequest, EntityRef, LinkOutcome, RelatedEntity, Relation, RelationType,
    RelationsView,
};
use crate::{Error, Result};

use super::EntityRegistry;

/// Service for creating, querying and removing entity relations.
#[derive(Clone)]
pub struct RelationGraph {
    db: DbPool,
    entities: Arc<EntityRegistry>,
}

impl RelationGraph {
    pub fn new(db: DbPool, entities: Arc<EntityRegistry>) -> Self {
        Self { db, entities }
    }

    /// The registry used to resolve relation targets.
    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a relation. Bidirectional relations record the reverse type
    /// so the edge can be read from the target's side.
    pub async fn create_relation(
        &self,
        request: &CreateRelationRequest,
        actor_id: i64,
    ) -> Result<Relation> {
        let input = prepare_relation(request, actor_id)?;
        let relation = db::create_relation(&self.db, input).await?;

        info!(
            relation_id = relation.id,
            source = %relation.source,
            target = %relation.target,
            relation_type = %relation.relation_type,
            bidirectional = relation.is_bidirectional,
            actor_id,
            "Relation created"
        );

        Ok(relation)
    }

    /// Create a relation unless an equivalent one (same endpoints and type)
    /// already exists.
    pub async fn link_records(
        &self,
        request: &CreateRelationRequest,
        actor_id: i64,
    ) -> Result<LinkOutcome> {
        let existing = db::find_relation(
            &self.db,
            request.source(),
            request.target(),
            Some(request.relation_type),
        )
        .await?;

        if let Some(relation) = existing {
            debug!(relation_id = relation.id, "Link already present");
            return Ok(LinkOutcome {
                relation_id: relation.id,
                created: false,
            });
        }

        let relation = self.create_relation(request, actor_id).await?;
        Ok(LinkOutcome {
            relation_id: relation.id,
            created: true,
        })
    }

    /// Remove relations from `source` to `target`, optionally of one type.
    pub async fn unlink_records(
        &self,
        source: EntityRef,
        target: EntityRef,
        relation_type: Option<RelationType>,
    ) -> Result<u64> {
        let removed = db::delete_relations_between(&self.db, source, target, relation_type).await?;
        info!(source = %source, target = %target, removed, "Records unlinked");
        Ok(removed)
    }

    /// Delete a relation by id.
    pub async fn delete_relation(&self, relation_id: i64) -> Result<()> {
        db::delete_relation(&self.db, relation_id).await?;
        info!(relation_id, "Relation deleted");
        Ok(())
    }

    /// Remove every relation touching an entity.
    pub async fn delete_entity_relations(&self, entity: EntityRef) -> Result<u64> {
        let removed = db::delete_entity_relations(&self.db, entity).await?;
        info!(entity = %entity, removed, "Entity relations removed");
        Ok(removed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Relations touching an entity: outgoing edges plus incoming
    /// bidirectional ones.
    pub async fn get_relations(&self, entity: EntityRef) -> RelationsView {
        let outgoing = db::list_outgoing_relations(&self.db, entity, None).await;
        let incoming = db::list_incoming_bidirectional(&self.db, entity).await;

        match (outgoing, incoming) {
            (Ok(outgoing), Ok(incoming)) => RelationsView { outgoing, incoming },
            (Err(e), _) | (_, Err(e)) => {
                warn!(entity = %entity, error = %e, "Relation read failed, returning empty view");
                RelationsView::default()
            }
        }
    }

    /// Targets of an entity's outgoing relations, in creation order.
    ///
    /// Relations whose target no longer resolves are skipped.
    pub async fn get_related_entities(
        &self,
        entity: EntityRef,
        relation_type: Option<RelationType>,
    ) -> Vec<RelatedEntity> {
        let relations = match db::list_outgoing_relations(&self.db, entity, relation_type).await {
            Ok(relations) => relations,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Relation read failed, returning no related entities");
                return Vec::new();
            }
        };

        let mut related = Vec::with_capacity(relations.len());
        for relation in relations {
            match self.entities.fetch(relation.target).await {
                Some(record) => related.push(RelatedEntity {
                    relation,
                    entity: record,
                }),
                None => debug!(
                    relation_id = relation.id,
                    target = %relation.target,
                    "Skipping relation with unresolved target"
                ),
            }
        }

        related
    }

    /// Whether a relation from `source` to `target` exists.
    pub async fn relation_exists(
        &self,
        source: EntityRef,
        target: EntityRef,
        relation_type: Option<RelationType>,
    ) -> bool {
        self.find_relation(source, target, relation_type).await.is_some()
    }

    /// First relation from `source` to `target`, if any.
    pub async fn find_relation(
        &self,
        source: EntityRef,
        target: EntityRef,
        relation_type: Option<RelationType>,
    ) -> Option<Relation> {
        match db::find_relation(&self.db, source, target, relation_type).await {
            Ok(relation) => relation,
            Err(e) => {
                warn!(source = %source, target = %target, error = %e, "Relation lookup failed");
                None
            }
        }
    }

    // ========================================================================
    // Task dependency views
    // ========================================================================

    /// Tasks this task is blocked by.
    pub async fn get_blocking_tasks(&self, task_id: i64) -> Vec<RelatedEntity> {
        self.get_related_entities(EntityRef::task(task_id), Some(RelationType::BlockedBy))
            .await
    }

    /// Tasks this task blocks.
    pub async fn get_blocked_tasks(&self, task_id: i64) -> Vec<RelatedEntity> {
        self.get_related_entities(EntityRef::task(task_id), Some(RelationType::Blocks))
            .await
    }

    /// Tasks this task depends on.
    pub async fn get_dependencies(&self, task_id: i64) -> Vec<RelatedEntity> {
        self.get_related_entities(EntityRef::task(task_id), Some(RelationType::DependsOn))
            .await
    }

    /// Tasks that depend on this task.
    pub async fn get_dependents(&self, task_id: i64) -> Vec<RelatedEntity> {
        self.get_related_entities(EntityRef::task(task_id), Some(RelationType::RequiredBy))
            .await
    }
}

/// Validate a create request and derive the stored row.
fn prepare_relation(request: &CreateRelationRequest, actor_id: i64) -> Result<CreateRelation> {
    let source = request.source();
    let target = request.target();

    let reverse_relation_type = if request.is_bidirectional {
        let reverse = request.relation_type.reverse().ok_or_else(|| {
            Error::Validation(format!(
                "Relation type '{}' cannot be bidirectional",
                request.relation_type
            ))
        })?;
        Some(reverse)
    } else {
        None
    };

    Ok(CreateRelation {
        source,
        target,
        relation_type: request.relation_type,
        is_bidirectional: request.is_bidirectional,
        reverse_relation_type,
        created_by: actor_id,
        metadata: request.metadata.clone(),
    })
}
