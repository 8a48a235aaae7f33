//! Lookup Field Routes
//!
//! Routes:
//! - POST /lookup-fields - Create a lookup field
//! - GET /lookup-fields?entity_type=&entity_id= - Fields applying to an entity (or the kind's templates)
//! - GET /lookup-fields/:id - Get a lookup field
//! - DELETE /lookup-fields/:id - Delete a lookup field
//! - GET /lookup-fields/:id/calculate/:kind/:entity_id - Compute the lookup for an entity
//! - GET /lookup-fields/values/:kind/:entity_id/:name - Compute the field named `name` that applies to an entity

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    models::{CreateLookupField, EntityKind, EntityRef, LookupFieldDef},
    AppState,
};

/// Build lookup field routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_lookup_field).get(list_lookup_fields))
        .route("/:id", get(get_lookup_field).delete(delete_lookup_field))
        .route("/:id/calculate/:kind/:entity_id", get(calculate_lookup))
        .route("/values/:kind/:entity_id/:name", get(lookup_value_by_name))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FieldsQuery {
    pub entity_type: EntityKind,
    #[serde(default)]
    pub entity_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupValueResponse {
    pub field_id: i64,
    pub entity: EntityRef,
    pub value: Value,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a lookup field.
///
/// POST /lookup-fields
async fn create_lookup_field(
    State(state): State<AppState>,
    Json(request): Json<CreateLookupField>,
) -> Result<(StatusCode, Json<LookupFieldDef>)> {
    let def = state.fields.create_lookup_field(request).await?;
    Ok((StatusCode::CREATED, Json(def)))
}

/// List lookup fields for an entity, or templates of a kind.
///
/// GET /lookup-fields?entity_type=task&entity_id=7
async fn list_lookup_fields(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Json<Vec<LookupFieldDef>> {
    Json(
        state
            .fields
            .get_lookup_fields(query.entity_type, query.entity_id)
            .await,
    )
}

/// Get a lookup field.
///
/// GET /lookup-fields/:id
async fn get_lookup_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LookupFieldDef>> {
    Ok(Json(state.fields.get_lookup_field(id).await?))
}

/// Delete a lookup field.
///
/// DELETE /lookup-fields/:id
async fn delete_lookup_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.fields.delete_lookup_field(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compute a lookup for an entity.
///
/// GET /lookup-fields/:id/calculate/:kind/:entity_id
async fn calculate_lookup(
    State(state): State<AppState>,
    Path((id, kind, entity_id)): Path<(i64, EntityKind, i64)>,
) -> Result<Json<LookupValueResponse>> {
    let def = state.fields.get_lookup_field(id).await?;
    let entity = EntityRef::new(kind, entity_id);
    let value = state.lookups.calculate(&def, entity).await;

    Ok(Json(LookupValueResponse {
        field_id: def.id,
        entity,
        value,
    }))
}

/// Compute a lookup by name, preferring the entity's own definition over
/// the kind's template.
///
/// GET /lookup-fields/values/:kind/:entity_id/:name
async fn lookup_value_by_name(
    State(state): State<AppState>,
    Path((kind, entity_id, name)): Path<(EntityKind, i64, String)>,
) -> Result<Json<LookupValueResponse>> {
    let def = state
        .fields
        .resolve_lookup_field(kind, entity_id, &name)
        .await
        .ok_or_else(|| {
            Error::NotFound(format!("Lookup field '{}' not found for {} {}", name, kind, entity_id))
        })?;
    let entity = EntityRef::new(kind, entity_id);
    let value = state.lookups.calculate(&def, entity).await;

    Ok(Json(LookupValueResponse {
        field_id: def.id,
        entity,
        value,
    }))
}
