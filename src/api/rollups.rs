//! Rollup Field Routes
//!
//! Routes:
//! - POST /rollup-fields - Create a rollup field
//! - GET /rollup-fields?entity_type=&entity_id= - Fields applying to an entity (or the kind's templates)
//! - GET /rollup-fields/:id - Get a rollup field
//! - DELETE /rollup-fields/:id - Delete a rollup field
//! - GET /rollup-fields/:id/calculate/:kind/:entity_id?refresh= - Cached value or fresh computation
//! - GET /rollup-fields/values/:kind/:entity_id/:name?refresh= - Value of the field named `name` that applies to an entity
//! - GET /rollup-fields/:id/cached - Stored value while it is fresh
//! - DELETE /rollup-fields/:id/cache - Drop the stored value

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    models::{CreateRollupField, EntityKind, EntityRef, RollupFieldDef, RollupResult},
    AppState,
};

use super::lookups::FieldsQuery;

/// Build rollup field routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_rollup_field).get(list_rollup_fields))
        .route("/:id", get(get_rollup_field).delete(delete_rollup_field))
        .route("/:id/calculate/:kind/:entity_id", get(calculate_rollup))
        .route("/values/:kind/:entity_id/:name", get(rollup_value_by_name))
        .route("/:id/cached", get(get_cached_value))
        .route("/:id/cache", delete(invalidate_cache))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CalculateQuery {
    /// Skip the cache and recompute
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RollupValueResponse {
    pub field_id: i64,
    pub entity: EntityRef,
    #[serde(flatten)]
    pub result: RollupResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedValueResponse {
    pub field_id: i64,
    pub cached: Option<RollupResult>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a rollup field.
///
/// POST /rollup-fields
async fn create_rollup_field(
    State(state): State<AppState>,
    Json(request): Json<CreateRollupField>,
) -> Result<(StatusCode, Json<RollupFieldDef>)> {
    let def = state.fields.create_rollup_field(request).await?;
    Ok((StatusCode::CREATED, Json(def)))
}

/// List rollup fields for an entity, or templates of a kind.
///
/// GET /rollup-fields?entity_type=project&entity_id=1
async fn list_rollup_fields(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Json<Vec<RollupFieldDef>> {
    Json(
        state
            .fields
            .get_rollup_fields(query.entity_type, query.entity_id)
            .await,
    )
}

/// Get a rollup field.
///
/// GET /rollup-fields/:id
async fn get_rollup_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RollupFieldDef>> {
    Ok(Json(state.fields.get_rollup_field(id).await?))
}

/// Delete a rollup field.
///
/// DELETE /rollup-fields/:id
async fn delete_rollup_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.fields.delete_rollup_field(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rollup value for an entity, served from cache while fresh.
///
/// GET /rollup-fields/:id/calculate/:kind/:entity_id?refresh=true
async fn calculate_rollup(
    State(state): State<AppState>,
    Path((id, kind, entity_id)): Path<(i64, EntityKind, i64)>,
    Query(query): Query<CalculateQuery>,
) -> Result<Json<RollupValueResponse>> {
    let def = state.fields.get_rollup_field(id).await?;
    Ok(Json(rollup_value(&state, &def, kind, entity_id, query.refresh).await))
}

/// Rollup value by name, preferring the entity's own definition over the
/// kind's template.
///
/// GET /rollup-fields/values/:kind/:entity_id/:name?refresh=true
async fn rollup_value_by_name(
    State(state): State<AppState>,
    Path((kind, entity_id, name)): Path<(EntityKind, i64, String)>,
    Query(query): Query<CalculateQuery>,
) -> Result<Json<RollupValueResponse>> {
    let def = state
        .fields
        .resolve_rollup_field(kind, entity_id, &name)
        .await
        .ok_or_else(|| {
            Error::NotFound(format!("Rollup field '{}' not found for {} {}", name, kind, entity_id))
        })?;
    Ok(Json(rollup_value(&state, &def, kind, entity_id, query.refresh).await))
}

async fn rollup_value(
    state: &AppState,
    def: &RollupFieldDef,
    kind: EntityKind,
    entity_id: i64,
    refresh: bool,
) -> RollupValueResponse {
    let entity = EntityRef::new(kind, entity_id);
    let result = if refresh {
        state.rollups.calculate(def, entity).await
    } else {
        state.rollups.value_or_recompute(def, entity).await
    };

    RollupValueResponse {
        field_id: def.id,
        entity,
        result,
    }
}

/// Stored rollup value, `null` when absent or expired.
///
/// GET /rollup-fields/:id/cached
async fn get_cached_value(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<CachedValueResponse> {
    Json(CachedValueResponse {
        field_id: id,
        cached: state.rollups.get_cached_value(id).await,
    })
}

/// Drop a rollup's stored value.
///
/// DELETE /rollup-fields/:id/cache
async fn invalidate_cache(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.rollups.invalidate_cache(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
