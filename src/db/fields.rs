//! Lookup and rollup field definition queries.
//!
//! Definitions are schema only. The rollup cache columns live on the
//! definition row and are written exclusively through
//! [`write_rollup_cache`] / [`clear_rollup_cache`].

use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::models::{
    CreateLookupField, CreateRollupField, EntityKind, LookupFieldDef, RollupFieldDef,
};
use crate::{Error, Result};

use super::DbPool;

// ============================================================================
// Lookup fields
// ============================================================================

/// Create a lookup field definition.
pub async fn create_lookup_field(pool: &DbPool, input: CreateLookupField) -> Result<LookupFieldDef> {
    let now = Utc::now();
    let display_name = input.display_name.unwrap_or_else(|| input.name.clone());

    let def = sqlx::query_as::<_, LookupFieldDef>(
        r#"
        INSERT INTO lookup_fields (
            owner_entity_kind, owner_entity_id, name, display_name, relation_type,
            source_property, display_format, aggregation, format_options,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.owner_entity_kind)
    .bind(input.owner_entity_id)
    .bind(&input.name)
    .bind(&display_name)
    .bind(input.relation_type)
    .bind(&input.source_property)
    .bind(input.display_format)
    .bind(input.aggregation)
    .bind(Json(&input.format_options))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(def)
}

/// Get a lookup field by ID.
pub async fn get_lookup_field(pool: &DbPool, id: i64) -> Result<LookupFieldDef> {
    sqlx::query_as::<_, LookupFieldDef>("SELECT * FROM lookup_fields WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Lookup field not found: {}", id)))
}

/// List lookup fields owned by exactly one owner.
///
/// `owner_entity_id = None` lists the templates of the kind.
pub async fn list_lookup_fields(
    pool: &DbPool,
    kind: EntityKind,
    owner_entity_id: Option<i64>,
) -> Result<Vec<LookupFieldDef>> {
    sqlx::query_as::<_, LookupFieldDef>(
        r#"
        SELECT * FROM lookup_fields
        WHERE owner_entity_kind = ? AND owner_entity_id IS ?
        ORDER BY id ASC
        "#,
    )
    .bind(kind)
    .bind(owner_entity_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Delete a lookup field.
pub async fn delete_lookup_field(pool: &DbPool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM lookup_fields WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lookup field not found: {}", id)));
    }

    Ok(())
}

// ============================================================================
// Rollup fields
// ============================================================================

/// Create a rollup field definition. Cache columns start empty.
pub async fn create_rollup_field(pool: &DbPool, input: CreateRollupField) -> Result<RollupFieldDef> {
    let now = Utc::now();
    let display_name = input.display_name.unwrap_or_else(|| input.name.clone());

    let def = sqlx::query_as::<_, RollupFieldDef>(
        r#"
        INSERT INTO rollup_fields (
            owner_entity_kind, owner_entity_id, name, display_name,
            source_relation_type, source_property, aggregation_function,
            filter_conditions, display_format, decimal_places, prefix, suffix,
            progress_bar_max, progress_bar_color, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.owner_entity_kind)
    .bind(input.owner_entity_id)
    .bind(&input.name)
    .bind(&display_name)
    .bind(input.source_relation_type)
    .bind(&input.source_property)
    .bind(input.aggregation_function)
    .bind(Json(&input.filter_conditions))
    .bind(input.display_format)
    .bind(input.decimal_places)
    .bind(&input.prefix)
    .bind(&input.suffix)
    .bind(input.progress_bar_max)
    .bind(&input.progress_bar_color)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(def)
}

/// Get a rollup field by ID.
pub async fn get_rollup_field(pool: &DbPool, id: i64) -> Result<RollupFieldDef> {
    sqlx::query_as::<_, RollupFieldDef>("SELECT * FROM rollup_fields WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Rollup field not found: {}", id)))
}

/// List rollup fields owned by exactly one owner.
pub async fn list_rollup_fields(
    pool: &DbPool,
    kind: EntityKind,
    owner_entity_id: Option<i64>,
) -> Result<Vec<RollupFieldDef>> {
    sqlx::query_as::<_, RollupFieldDef>(
        r#"
        SELECT * FROM rollup_fields
        WHERE owner_entity_kind = ? AND owner_entity_id IS ?
        ORDER BY id ASC
        "#,
    )
    .bind(kind)
    .bind(owner_entity_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Delete a rollup field.
pub async fn delete_rollup_field(pool: &DbPool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM rollup_fields WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Rollup field not found: {}", id)));
    }

    Ok(())
}

/// Store a computed rollup in the definition's cache columns.
pub async fn write_rollup_cache(
    pool: &DbPool,
    id: i64,
    cached_value: &str,
    calculated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE rollup_fields
        SET cached_value = ?, last_calculated_at = ?, cache_expires_at = ?
        WHERE id = ?
        "#,
    )
    .bind(cached_value)
    .bind(calculated_at)
    .bind(expires_at)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Rollup field not found: {}", id)));
    }

    Ok(())
}

/// Clear a rollup's cache columns.
pub async fn clear_rollup_cache(pool: &DbPool, id: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE rollup_fields
        SET cached_value = NULL, last_calculated_at = NULL, cache_expires_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Rollup field not found: {}", id)));
    }

    Ok(())
}
