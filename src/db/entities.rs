//! Project hierarchy database queries.
//!
//! Projects contain blocks, blocks contain sections, sections contain
//! tasks and tasks contain subtasks. The derived-field engines only read
//! these rows through the entity registry; writes here are plumbing for
//! the surrounding product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::models::EntityKind;
use crate::{Error, Result};

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// A typed row of one entity kind.
pub trait EntityRow: for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin + 'static {
    const KIND: EntityKind;
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub block_id: i64,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub section_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub assignee_id: Option<i64>,
    pub due_date: Option<String>,
    pub estimated_hours: Option<f64>,
    pub progress: Option<f64>,
    pub completed: bool,
    /// User-defined properties, reachable by dot-path
    pub custom_fields: Json<Value>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub completed: bool,
    pub estimated_hours: Option<f64>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRow for Project {
    const KIND: EntityKind = EntityKind::Project;
}

impl EntityRow for Block {
    const KIND: EntityKind = EntityKind::Block;
}

impl EntityRow for Section {
    const KIND: EntityKind = EntityKind::Section;
}

impl EntityRow for Task {
    const KIND: EntityKind = EntityKind::Task;
}

impl EntityRow for Subtask {
    const KIND: EntityKind = EntityKind::Subtask;
}

/// Input for creating a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

/// Input for creating a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBlock {
    pub project_id: i64,
    pub title: String,
    #[serde(default)]
    pub position: i64,
}

/// Input for creating a section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSection {
    pub block_id: i64,
    pub name: String,
    #[serde(default)]
    pub position: i64,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTask {
    #[serde(default)]
    pub section_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub custom_fields: Option<Value>,
    #[serde(default)]
    pub position: i64,
}

/// Input for creating a subtask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSubtask {
    pub task_id: i64,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub position: i64,
}

/// Partial update of a task. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub custom_fields: Option<Value>,
}

/// Partial update of a subtask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubtask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new project.
pub async fn create_project(pool: &DbPool, input: CreateProject) -> Result<Project> {
    let now = Utc::now();
    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (name, description, status, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.status.as_deref().unwrap_or("active"))
    .bind(input.owner_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(project)
}

/// Create a new block inside a project.
pub async fn create_block(pool: &DbPool, input: CreateBlock) -> Result<Block> {
    let now = Utc::now();
    let block = sqlx::query_as::<_, Block>(
        r#"
        INSERT INTO blocks (project_id, title, position, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.project_id)
    .bind(&input.title)
    .bind(input.position)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_error(e, "project", input.project_id))?;

    Ok(block)
}

/// Create a new section inside a block.
pub async fn create_section(pool: &DbPool, input: CreateSection) -> Result<Section> {
    let now = Utc::now();
    let section = sqlx::query_as::<_, Section>(
        r#"
        INSERT INTO sections (block_id, name, position, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.block_id)
    .bind(&input.name)
    .bind(input.position)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_error(e, "block", input.block_id))?;

    Ok(section)
}

/// Create a new task, optionally inside a section.
pub async fn create_task(pool: &DbPool, input: CreateTask) -> Result<Task> {
    let now = Utc::now();
    let custom_fields = input
        .custom_fields
        .unwrap_or_else(|| Value::Object(Default::default()));

    let task = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (
            section_id, title, description, status, priority, assignee_id,
            due_date, estimated_hours, progress, completed, custom_fields,
            position, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.section_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.status.as_deref().unwrap_or("todo"))
    .bind(&input.priority)
    .bind(input.assignee_id)
    .bind(&input.due_date)
    .bind(input.estimated_hours)
    .bind(input.progress)
    .bind(input.completed)
    .bind(Json(custom_fields))
    .bind(input.position)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_error(e, "section", input.section_id.unwrap_or_default()))?;

    Ok(task)
}

/// Create a new subtask under a task.
pub async fn create_subtask(pool: &DbPool, input: CreateSubtask) -> Result<Subtask> {
    let now = Utc::now();
    let subtask = sqlx::query_as::<_, Subtask>(
        r#"
        INSERT INTO subtasks (task_id, title, completed, estimated_hours, position, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.task_id)
    .bind(&input.title)
    .bind(input.completed)
    .bind(input.estimated_hours)
    .bind(input.position)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_error(e, "task", input.task_id))?;

    Ok(subtask)
}

/// Get a row of any entity kind by ID.
pub async fn get_entity_row<R: EntityRow>(pool: &DbPool, id: i64) -> Result<Option<R>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", R::KIND.table());
    let row = sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Get a task by ID.
pub async fn get_task(pool: &DbPool, id: i64) -> Result<Task> {
    get_entity_row::<Task>(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))
}

/// Update a task.
pub async fn update_task(pool: &DbPool, id: i64, input: UpdateTask) -> Result<Task> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            status = COALESCE(?, status),
            priority = COALESCE(?, priority),
            assignee_id = COALESCE(?, assignee_id),
            due_date = COALESCE(?, due_date),
            estimated_hours = COALESCE(?, estimated_hours),
            progress = COALESCE(?, progress),
            completed = COALESCE(?, completed),
            custom_fields = COALESCE(?, custom_fields),
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.status)
    .bind(&input.priority)
    .bind(input.assignee_id)
    .bind(&input.due_date)
    .bind(input.estimated_hours)
    .bind(input.progress)
    .bind(input.completed)
    .bind(input.custom_fields.map(Json))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))
}

/// Update a subtask.
pub async fn update_subtask(pool: &DbPool, id: i64, input: UpdateSubtask) -> Result<Subtask> {
    sqlx::query_as::<_, Subtask>(
        r#"
        UPDATE subtasks SET
            title = COALESCE(?, title),
            completed = COALESCE(?, completed),
            estimated_hours = COALESCE(?, estimated_hours),
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&input.title)
    .bind(input.completed)
    .bind(input.estimated_hours)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Subtask not found: {}", id)))
}

/// Delete an entity row of any kind.
pub async fn delete_entity(pool: &DbPool, kind: EntityKind, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("{} not found: {}", kind, id)));
    }

    Ok(())
}

/// Map a foreign-key violation on insert to a not-found parent.
fn foreign_key_error(err: sqlx::Error, parent: &str, parent_id: i64) -> Error {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            Error::NotFound(format!("Parent {} not found: {}", parent, parent_id))
        }
        other => other.into(),
    }
}
