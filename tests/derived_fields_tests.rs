//! Lookup and rollup field integration tests.
//!
//! Builds small project/task graphs over HTTP and checks computed values
//! and rollup cache behavior end to end.

mod common;

use axum::http::StatusCode;
use common::{fields_config, test_app, test_app_with, TestApp};
use serde_json::{json, Value};
use trellis::models::EntityRef;

/// Project with three child tasks, two of them completed.
async fn project_with_tasks(app: &TestApp) -> (i64, Vec<i64>) {
    let project = app.create_project("Launch").await;
    let mut tasks = Vec::new();
    for (title, status, hours) in [
        ("Design", "completed", 1.5),
        ("Build", "completed", 2.25),
        ("Ship", "in_progress", 4.0),
    ] {
        let id = app
            .create_task_with(json!({
                "title": title,
                "status": status,
                "estimated_hours": hours,
            }))
            .await;
        app.link(("project", project), ("task", id), "parent_child", false)
            .await;
        tasks.push(id);
    }
    (project, tasks)
}

async fn create_rollup(app: &TestApp, body: Value) -> i64 {
    let def = app.post("/rollup-fields", body, StatusCode::CREATED).await;
    def["id"].as_i64().unwrap()
}

async fn rollup_value(app: &TestApp, field: i64, kind: &str, id: i64) -> Value {
    app.get(&format!("/rollup-fields/{}/calculate/{}/{}", field, kind, id))
        .await
}

fn completion_rollup(project: i64) -> Value {
    json!({
        "owner_entity_kind": "project",
        "owner_entity_id": project,
        "name": "completion",
        "source_relation_type": "parent_child",
        "source_property": "status",
        "aggregation_function": "percent_checked",
        "display_format": "percentage",
        "decimal_places": 1,
    })
}

// ============================================================================
// Rollups
// ============================================================================

#[tokio::test]
async fn test_rollup_percent_checked() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    let body = rollup_value(&app, field, "project", project).await;

    assert_eq!(body["field_id"], field);
    assert_eq!(body["entity"], json!({ "kind": "project", "id": project }));
    assert_eq!(body["value"], json!(66.7));
    assert_eq!(body["formatted"], "66.7%");
}

#[tokio::test]
async fn test_rollup_count_unique_statuses() {
    let app = test_app().await;
    let project = app.create_project("Board").await;
    for status in ["todo", "doing", "todo", "done"] {
        let id = app.create_task("Task", status).await;
        app.link(("project", project), ("task", id), "parent_child", false)
            .await;
    }

    let field = create_rollup(
        &app,
        json!({
            "owner_entity_kind": "project",
            "owner_entity_id": project,
            "name": "distinct_statuses",
            "source_relation_type": "parent_child",
            "source_property": "status",
            "aggregation_function": "count_unique",
        }),
    )
    .await;

    let body = rollup_value(&app, field, "project", project).await;
    assert_eq!(body["value"], json!(3));
    assert_eq!(body["formatted"], "3");
}

#[tokio::test]
async fn test_rollup_sum_as_duration_with_filter() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;

    let field = create_rollup(
        &app,
        json!({
            "owner_entity_kind": "project",
            "owner_entity_id": project,
            "name": "done_hours",
            "source_relation_type": "parent_child",
            "source_property": "estimated_hours",
            "aggregation_function": "sum",
            "display_format": "duration",
            "filter_conditions": [
                { "property": "status", "operator": "equals", "value": "completed" }
            ],
        }),
    )
    .await;

    let body = rollup_value(&app, field, "project", project).await;
    assert_eq!(body["value"], json!(3.75));
    assert_eq!(body["formatted"], "3h 45m");
}

#[tokio::test]
async fn test_rollup_without_related_entities_is_zero() {
    let app = test_app().await;
    let project = app.create_project("Empty").await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    let body = rollup_value(&app, field, "project", project).await;
    assert_eq!(body["value"], json!(0));
    assert_eq!(body["formatted"], "0.0%");
}

#[tokio::test]
async fn test_rollup_served_from_cache_until_refresh() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    let first = rollup_value(&app, field, "project", project).await;
    assert_eq!(first["formatted"], "66.7%");

    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert_eq!(cached["cached"]["formatted"], "66.7%");

    // A fourth completed task; the cached value is still fresh.
    let extra = app.create_task("Docs", "completed").await;
    app.link(("project", project), ("task", extra), "parent_child", false)
        .await;

    let stale = rollup_value(&app, field, "project", project).await;
    assert_eq!(stale["formatted"], "66.7%");

    let fresh = app
        .get(&format!(
            "/rollup-fields/{}/calculate/project/{}?refresh=true",
            field, project
        ))
        .await;
    assert_eq!(fresh["value"], json!(75));
    assert_eq!(fresh["formatted"], "75.0%");

    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert_eq!(cached["cached"]["formatted"], "75.0%");
}

#[tokio::test]
async fn test_rollup_cache_expires_with_zero_ttl() {
    let app = test_app_with(fields_config(0, false)).await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    rollup_value(&app, field, "project", project).await;
    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert!(cached["cached"].is_null());

    let extra = app.create_task("Docs", "completed").await;
    app.link(("project", project), ("task", extra), "parent_child", false)
        .await;

    let body = rollup_value(&app, field, "project", project).await;
    assert_eq!(body["formatted"], "75.0%");
}

#[tokio::test]
async fn test_invalidate_cache_forces_recompute() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;
    rollup_value(&app, field, "project", project).await;

    app.delete(
        &format!("/rollup-fields/{}/cache", field),
        StatusCode::NO_CONTENT,
    )
    .await;

    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert!(cached["cached"].is_null());

    let extra = app.create_task("Docs", "in_progress").await;
    app.link(("project", project), ("task", extra), "parent_child", false)
        .await;

    let body = rollup_value(&app, field, "project", project).await;
    assert_eq!(body["formatted"], "50.0%");
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    let path = format!(
        "/rollup-fields/{}/calculate/project/{}?refresh=true",
        field, project
    );
    let first = app.get(&path).await;
    let second = app.get(&path).await;

    assert_eq!(first["value"], second["value"]);
    assert_eq!(first["formatted"], second["formatted"]);
}

#[tokio::test]
async fn test_template_rollup_computes_per_entity() {
    let app = test_app().await;
    let (launch, _) = project_with_tasks(&app).await;
    let other = app.create_project("Other").await;
    let done = app.create_task("Only", "done").await;
    app.link(("project", other), ("task", done), "parent_child", false)
        .await;

    let mut template = completion_rollup(launch);
    template["owner_entity_id"] = Value::Null;
    let field = create_rollup(&app, template).await;

    let launch_value = rollup_value(&app, field, "project", launch).await;
    let other_value = rollup_value(&app, field, "project", other).await;

    assert_eq!(launch_value["formatted"], "66.7%");
    assert_eq!(other_value["formatted"], "100.0%");
}

#[tokio::test]
async fn test_foreign_anchor_does_not_overwrite_owner_cache() {
    let app = test_app().await;
    let (launch, _) = project_with_tasks(&app).await;
    let other = app.create_project("Other").await;
    let done = app.create_task("Only", "done").await;
    app.link(("project", other), ("task", done), "parent_child", false)
        .await;

    let field = create_rollup(&app, completion_rollup(launch)).await;

    let owner = rollup_value(&app, field, "project", launch).await;
    assert_eq!(owner["formatted"], "66.7%");

    let foreign = rollup_value(&app, field, "project", other).await;
    assert_eq!(foreign["formatted"], "100.0%");

    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert_eq!(cached["cached"]["formatted"], "66.7%");

    let owner_again = rollup_value(&app, field, "project", launch).await;
    assert_eq!(owner_again["formatted"], "66.7%");
}

#[tokio::test]
async fn test_template_rollup_leaves_cache_empty() {
    let app = test_app().await;
    let (launch, _) = project_with_tasks(&app).await;

    let mut template = completion_rollup(launch);
    template["owner_entity_id"] = Value::Null;
    let field = create_rollup(&app, template).await;

    rollup_value(&app, field, "project", launch).await;

    let cached = app.get(&format!("/rollup-fields/{}/cached", field)).await;
    assert!(cached["cached"].is_null());
}

#[tokio::test]
async fn test_single_flight_recomputes_agree() {
    let app = test_app_with(fields_config(300, true)).await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;

    let def = app.state.fields.get_rollup_field(field).await.unwrap();
    let anchor = EntityRef::project(project);
    let rollups = &app.state.rollups;

    let (a, b, c) = tokio::join!(
        rollups.value_or_recompute(&def, anchor),
        rollups.value_or_recompute(&def, anchor),
        rollups.value_or_recompute(&def, anchor),
    );

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.formatted, "66.7%");
    assert_eq!(rollups.get_cached_value(field).await, Some(a));
}

#[tokio::test]
async fn test_rollup_reads_soft_fail_when_database_closed() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;
    let field = create_rollup(&app, completion_rollup(project)).await;
    let def = app.state.fields.get_rollup_field(field).await.unwrap();

    app.db.close().await;

    let result = app
        .state
        .rollups
        .calculate(&def, EntityRef::project(project))
        .await;
    assert_eq!(result.value, json!(0));
    assert!(app.state.rollups.get_cached_value(field).await.is_none());
    assert!(app.state.rollups.invalidate_cache(field).await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_rollup_field_validation() {
    let app = test_app().await;
    let mut body = completion_rollup(1);
    body["progress_bar_max"] = json!(0);
    app.post("/rollup-fields", body, StatusCode::BAD_REQUEST).await;

    let mut body = completion_rollup(1);
    body["source_property"] = json!("fields..status");
    app.post("/rollup-fields", body, StatusCode::BAD_REQUEST).await;
}

// ============================================================================
// Lookups
// ============================================================================

fn title_lookup(owner: Option<i64>, name: &str, aggregation: &str) -> Value {
    json!({
        "owner_entity_kind": "project",
        "owner_entity_id": owner,
        "name": name,
        "relation_type": "parent_child",
        "source_property": "title",
        "aggregation": aggregation,
        "format_options": { "max_items": 2 },
    })
}

#[tokio::test]
async fn test_lookup_comma_list_truncates() {
    let app = test_app().await;
    let project = app.create_project("Launch").await;
    for title in ["Alpha", "Beta", "Gamma", "Delta"] {
        let id = app.create_task(title, "todo").await;
        app.link(("project", project), ("task", id), "parent_child", false)
            .await;
    }

    let def = app
        .post(
            "/lookup-fields",
            title_lookup(Some(project), "titles", "comma_list"),
            StatusCode::CREATED,
        )
        .await;
    let field = def["id"].as_i64().unwrap();

    let body = app
        .get(&format!(
            "/lookup-fields/{}/calculate/project/{}",
            field, project
        ))
        .await;
    assert_eq!(body["value"], "Alpha, Beta +2 more");
}

#[tokio::test]
async fn test_lookup_first_and_count() {
    let app = test_app().await;
    let (project, _) = project_with_tasks(&app).await;

    let first = app
        .post(
            "/lookup-fields",
            title_lookup(Some(project), "first_title", "first"),
            StatusCode::CREATED,
        )
        .await;
    let count = app
        .post(
            "/lookup-fields",
            title_lookup(Some(project), "task_count", "count"),
            StatusCode::CREATED,
        )
        .await;

    let value = |field: &Value| {
        format!(
            "/lookup-fields/{}/calculate/project/{}",
            field["id"], project
        )
    };
    assert_eq!(app.get(&value(&first)).await["value"], "Design");
    assert_eq!(app.get(&value(&count)).await["value"], json!(3));
}

#[tokio::test]
async fn test_lookup_without_related_uses_empty_text() {
    let app = test_app().await;
    let project = app.create_project("Empty").await;

    let mut body = title_lookup(Some(project), "titles", "comma_list");
    body["format_options"] = json!({ "empty_text": "None yet" });
    let def = app
        .post("/lookup-fields", body, StatusCode::CREATED)
        .await;

    let value = app
        .get(&format!(
            "/lookup-fields/{}/calculate/project/{}",
            def["id"], project
        ))
        .await;
    assert_eq!(value["value"], "None yet");
}

#[tokio::test]
async fn test_concrete_lookup_shadows_template_by_name() {
    let app = test_app().await;
    let project = app.create_project("Launch").await;

    app.post(
        "/lookup-fields",
        title_lookup(None, "titles", "comma_list"),
        StatusCode::CREATED,
    )
    .await;
    app.post(
        "/lookup-fields",
        title_lookup(None, "lead", "first"),
        StatusCode::CREATED,
    )
    .await;
    let concrete = app
        .post(
            "/lookup-fields",
            title_lookup(Some(project), "titles", "all"),
            StatusCode::CREATED,
        )
        .await;

    let fields = app
        .get(&format!(
            "/lookup-fields?entity_type=project&entity_id={}",
            project
        ))
        .await;
    let fields = fields.as_array().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0]["id"], concrete["id"]);
    assert_eq!(fields[0]["aggregation"], "all");
    assert_eq!(fields[1]["name"], "lead");

    let templates = app.get("/lookup-fields?entity_type=project").await;
    assert_eq!(templates.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_lookup_value_by_name_prefers_own_definition() {
    let app = test_app().await;
    let launch = app.create_project("Launch").await;
    let other = app.create_project("Other").await;
    for (project, title) in [(launch, "Alpha"), (launch, "Beta"), (other, "Gamma")] {
        let id = app.create_task(title, "todo").await;
        app.link(("project", project), ("task", id), "parent_child", false)
            .await;
    }

    app.post(
        "/lookup-fields",
        title_lookup(None, "titles", "comma_list"),
        StatusCode::CREATED,
    )
    .await;
    let own = app
        .post(
            "/lookup-fields",
            title_lookup(Some(launch), "titles", "last"),
            StatusCode::CREATED,
        )
        .await;

    let body = app
        .get(&format!("/lookup-fields/values/project/{}/titles", launch))
        .await;
    assert_eq!(body["field_id"], own["id"]);
    assert_eq!(body["value"], "Beta");

    let body = app
        .get(&format!("/lookup-fields/values/project/{}/titles", other))
        .await;
    assert_eq!(body["value"], "Gamma");

    app.server
        .get(&format!("/lookup-fields/values/project/{}/missing", other))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rollup_value_by_name_falls_back_to_template() {
    let app = test_app().await;
    let (launch, _) = project_with_tasks(&app).await;

    let mut template = completion_rollup(launch);
    template["owner_entity_id"] = Value::Null;
    let field = create_rollup(&app, template).await;

    let body = app
        .get(&format!("/rollup-fields/values/project/{}/completion", launch))
        .await;
    assert_eq!(body["field_id"], field);
    assert_eq!(body["formatted"], "66.7%");

    app.server
        .get(&format!("/rollup-fields/values/project/{}/velocity", launch))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lookup_rejects_zero_max_items() {
    let app = test_app().await;
    let mut body = title_lookup(None, "titles", "comma_list");
    body["format_options"] = json!({ "max_items": 0 });

    app.post("/lookup-fields", body, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_missing_lookup_field_is_not_found() {
    let app = test_app().await;
    app.server
        .get("/lookup-fields/999/calculate/project/1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
