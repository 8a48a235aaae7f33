//! Relation Routes
//!
//! Routes:
//! - POST /relations - Create a relation
//! - POST /relations/link - Create a relation unless an equivalent one exists
//! - POST /relations/unlink - Remove relations between two entities
//! - DELETE /relations/:id - Delete a relation
//! - GET /relations/:kind/:id - Outgoing and incoming relations of an entity
//! - GET /relations/:kind/:id/related - Entities related to an entity

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    middleware::Actor,
    models::{
        CreateRelationRequest, EntityKind, EntityRef, LinkOutcome, RelatedEntity, Relation,
        RelationType, RelationsView, UnlinkRequest,
    },
    AppState,
};

/// Build relation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_relation))
        .route("/link", post(link_records))
        .route("/unlink", post(unlink_records))
        .route("/:id", delete(delete_relation))
        .route("/:kind/:id", get(get_relations))
        .route("/:kind/:id/related", get(get_related_entities))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    #[serde(default)]
    pub relation_type: Option<RelationType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlinkResponse {
    pub removed: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a relation.
///
/// POST /relations
async fn create_relation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateRelationRequest>,
) -> Result<(StatusCode, Json<Relation>)> {
    reject_self_relation(&request)?;
    let relation = state.relations.create_relation(&request, actor.id).await?;
    Ok((StatusCode::CREATED, Json(relation)))
}

/// Idempotently link two entities.
///
/// POST /relations/link
///
/// Returns 201 when a relation was created, 200 when one already existed.
async fn link_records(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateRelationRequest>,
) -> Result<(StatusCode, Json<LinkOutcome>)> {
    reject_self_relation(&request)?;
    let outcome = state.relations.link_records(&request, actor.id).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// Remove relations between two entities.
///
/// POST /relations/unlink
async fn unlink_records(
    State(state): State<AppState>,
    Json(request): Json<UnlinkRequest>,
) -> Result<Json<UnlinkResponse>> {
    let source = EntityRef::new(request.source_type, request.source_id);
    let target = EntityRef::new(request.target_type, request.target_id);

    let removed = state
        .relations
        .unlink_records(source, target, request.relation_type)
        .await?;

    Ok(Json(UnlinkResponse { removed }))
}

/// Delete a relation.
///
/// DELETE /relations/:id
async fn delete_relation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.relations.delete_relation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Relations touching an entity.
///
/// GET /relations/:kind/:id
async fn get_relations(
    State(state): State<AppState>,
    Path((kind, id)): Path<(EntityKind, i64)>,
) -> Json<RelationsView> {
    Json(state.relations.get_relations(EntityRef::new(kind, id)).await)
}

/// Entities related to an entity, optionally by one relation type.
///
/// GET /relations/:kind/:id/related?relation_type=blocks
async fn get_related_entities(
    State(state): State<AppState>,
    Path((kind, id)): Path<(EntityKind, i64)>,
    Query(query): Query<RelatedQuery>,
) -> Json<Vec<RelatedEntity>> {
    Json(
        state
            .relations
            .get_related_entities(EntityRef::new(kind, id), query.relation_type)
            .await,
    )
}

fn reject_self_relation(request: &CreateRelationRequest) -> Result<()> {
    if request.source() == request.target() {
        return Err(Error::Validation(format!(
            "An entity cannot be related to itself: {}",
            request.source()
        )));
    }
    Ok(())
}
