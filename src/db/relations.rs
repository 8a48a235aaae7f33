//! Entity relation database queries.
//!
//! Relations form the edges of the entity graph. Each edge is one row,
//! source -> target; bidirectional edges are found from the target side
//! by the `is_bidirectional` flag instead of a mirrored row.

use chrono::Utc;
use sqlx::types::Json;

use crate::models::{EntityRef, Relation, RelationMetadata, RelationRow, RelationType};
use crate::{Error, Result};

use super::DbPool;

/// Input for creating a new relation.
#[derive(Debug, Clone)]
pub struct CreateRelation {
    pub source: EntityRef,
    pub target: EntityRef,
    pub relation_type: RelationType,
    pub is_bidirectional: bool,
    pub reverse_relation_type: Option<RelationType>,
    pub created_by: i64,
    pub metadata: RelationMetadata,
}

// ============================================================================
// Queries
// ============================================================================

/// Insert a relation row.
pub async fn create_relation(pool: &DbPool, input: CreateRelation) -> Result<Relation> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, RelationRow>(
        r#"
        INSERT INTO entity_relations (
            source_type, source_id, target_type, target_id, relation_type,
            is_bidirectional, reverse_relation_type, created_by, metadata,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.source.kind)
    .bind(input.source.id)
    .bind(input.target.kind)
    .bind(input.target.id)
    .bind(input.relation_type)
    .bind(input.is_bidirectional)
    .bind(input.reverse_relation_type)
    .bind(input.created_by)
    .bind(Json(&input.metadata))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get a relation by ID.
pub async fn get_relation(pool: &DbPool, id: i64) -> Result<Relation> {
    sqlx::query_as::<_, RelationRow>("SELECT * FROM entity_relations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Relation::from)
        .ok_or_else(|| Error::NotFound(format!("Relation not found: {}", id)))
}

/// Delete a relation by ID.
pub async fn delete_relation(pool: &DbPool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM entity_relations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Relation not found: {}", id)));
    }

    Ok(())
}

/// List relations where the entity is the source, oldest first.
/// Uses idx_relations_source index.
pub async fn list_outgoing_relations(
    pool: &DbPool,
    entity: EntityRef,
    relation_type: Option<RelationType>,
) -> Result<Vec<Relation>> {
    let rows = sqlx::query_as::<_, RelationRow>(
        r#"
        SELECT * FROM entity_relations
        WHERE source_type = ? AND source_id = ?
          AND (? IS NULL OR relation_type = ?)
        ORDER BY id ASC
        "#,
    )
    .bind(entity.kind)
    .bind(entity.id)
    .bind(relation_type)
    .bind(relation_type)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Relation::from).collect())
}

/// List bidirectional relations where the entity is the target.
/// Uses idx_relations_target index.
pub async fn list_incoming_bidirectional(pool: &DbPool, entity: EntityRef) -> Result<Vec<Relation>> {
    let rows = sqlx::query_as::<_, RelationRow>(
        r#"
        SELECT * FROM entity_relations
        WHERE target_type = ? AND target_id = ? AND is_bidirectional = 1
        ORDER BY id ASC
        "#,
    )
    .bind(entity.kind)
    .bind(entity.id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Relation::from).collect())
}

/// Find the first relation between two endpoints, optionally of one type.
pub async fn find_relation(
    pool: &DbPool,
    source: EntityRef,
    target: EntityRef,
    relation_type: Option<RelationType>,
) -> Result<Option<Relation>> {
    let row = sqlx::query_as::<_, RelationRow>(
        r#"
        SELECT * FROM entity_relations
        WHERE source_type = ? AND source_id = ?
          AND target_type = ? AND target_id = ?
          AND (? IS NULL OR relation_type = ?)
        ORDER BY id ASC
        LIMIT 1
        "#,
    )
    .bind(source.kind)
    .bind(source.id)
    .bind(target.kind)
    .bind(target.id)
    .bind(relation_type)
    .bind(relation_type)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Relation::from))
}

/// Delete relations between two endpoints, optionally of one type.
pub async fn delete_relations_between(
    pool: &DbPool,
    source: EntityRef,
    target: EntityRef,
    relation_type: Option<RelationType>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM entity_relations
        WHERE source_type = ? AND source_id = ?
          AND target_type = ? AND target_id = ?
          AND (? IS NULL OR relation_type = ?)
        "#,
    )
    .bind(source.kind)
    .bind(source.id)
    .bind(target.kind)
    .bind(target.id)
    .bind(relation_type)
    .bind(relation_type)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete all relations touching an entity (as source or target).
pub async fn delete_entity_relations(pool: &DbPool, entity: EntityRef) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM entity_relations
        WHERE (source_type = ? AND source_id = ?)
           OR (target_type = ? AND target_id = ?)
        "#,
    )
    .bind(entity.kind)
    .bind(entity.id)
    .bind(entity.kind)
    .bind(entity.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Count stored relation rows.
pub async fn count_relations(pool: &DbPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_relations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
