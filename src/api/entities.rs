//! Entity Routes
//!
//! Minimal CRUD for the project hierarchy, so relations and derived fields
//! have something to point at.
//!
//! Routes:
//! - POST /entities/projects - Create a project
//! - POST /entities/blocks - Create a block
//! - POST /entities/sections - Create a section
//! - POST /entities/tasks - Create a task
//! - POST /entities/subtasks - Create a subtask
//! - GET /entities/:kind/:id - Fetch any entity as a record
//! - PATCH /entities/:kind/:id - Update a task or subtask
//! - DELETE /entities/:kind/:id - Delete an entity and its relations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::Value;
use tracing::info;

use crate::{
    db::{
        self, Block, CreateBlock, CreateProject, CreateSection, CreateSubtask, CreateTask, Project,
        Section, Subtask, Task, UpdateSubtask, UpdateTask,
    },
    error::{Error, Result},
    middleware::Actor,
    models::{EntityKind, EntityRef, Record},
    AppState,
};

/// Build entity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/blocks", post(create_block))
        .route("/sections", post(create_section))
        .route("/tasks", post(create_task))
        .route("/subtasks", post(create_subtask))
        .route(
            "/:kind/:id",
            get(get_entity).patch(update_entity).delete(delete_entity),
        )
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a project.
///
/// POST /entities/projects
async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProject>,
) -> Result<(StatusCode, Json<Project>)> {
    require_text(&request.name, "Project name")?;
    let project = db::create_project(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// Create a block.
///
/// POST /entities/blocks
async fn create_block(
    State(state): State<AppState>,
    Json(request): Json<CreateBlock>,
) -> Result<(StatusCode, Json<Block>)> {
    require_text(&request.title, "Block title")?;
    let block = db::create_block(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

/// Create a section.
///
/// POST /entities/sections
async fn create_section(
    State(state): State<AppState>,
    Json(request): Json<CreateSection>,
) -> Result<(StatusCode, Json<Section>)> {
    require_text(&request.name, "Section name")?;
    let section = db::create_section(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

/// Create a task.
///
/// POST /entities/tasks
async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>)> {
    require_text(&request.title, "Task title")?;
    if let Some(fields) = &request.custom_fields {
        if !fields.is_object() {
            return Err(Error::Validation("custom_fields must be an object".to_string()));
        }
    }
    let task = db::create_task(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Create a subtask.
///
/// POST /entities/subtasks
async fn create_subtask(
    State(state): State<AppState>,
    Json(request): Json<CreateSubtask>,
) -> Result<(StatusCode, Json<Subtask>)> {
    require_text(&request.title, "Subtask title")?;
    let subtask = db::create_subtask(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

/// Update a task or subtask. Omitted fields are left unchanged.
///
/// PATCH /entities/:kind/:id
async fn update_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(EntityKind, i64)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let updated = match kind {
        EntityKind::Task => {
            let input: UpdateTask = serde_json::from_value(body)?;
            serde_json::to_value(db::update_task(&state.db, id, input).await?)?
        }
        EntityKind::Subtask => {
            let input: UpdateSubtask = serde_json::from_value(body)?;
            serde_json::to_value(db::update_subtask(&state.db, id, input).await?)?
        }
        other => {
            return Err(Error::InvalidInput(format!(
                "Updating {} entities is not supported",
                other
            )))
        }
    };

    Ok(Json(updated))
}

/// Fetch any entity through the registry.
///
/// GET /entities/:kind/:id
async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(EntityKind, i64)>,
) -> Result<Json<Record>> {
    let accessor = state
        .entities
        .get(kind)
        .ok_or_else(|| Error::InvalidInput(format!("Unsupported entity kind: {}", kind)))?;

    accessor
        .fetch(id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("{} not found: {}", kind, id)))
}

/// Delete an entity together with every relation touching it.
///
/// DELETE /entities/:kind/:id
async fn delete_entity(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((kind, id)): Path<(EntityKind, i64)>,
) -> Result<StatusCode> {
    let entity = EntityRef::new(kind, id);

    db::delete_entity(&state.db, kind, id).await?;
    let removed = state.relations.delete_entity_relations(entity).await?;

    info!(entity = %entity, relations_removed = removed, actor_id = actor.id, "Entity deleted");
    Ok(StatusCode::NO_CONTENT)
}
