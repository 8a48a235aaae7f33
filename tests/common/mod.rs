//! Shared helpers for integration tests.
//!
//! Every server runs against its own in-memory SQLite database.

#![allow(dead_code)]

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    Router,
};
use axum_test::TestServer;
use serde_json::{json, Value};
use trellis::config::FieldsConfig;
use trellis::db::{self, DbPool};
use trellis::{api, AppState};

pub const ACTOR_ID: i64 = 42;

pub fn actor_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-actor-id"),
        HeaderValue::from_str(&ACTOR_ID.to_string()).unwrap(),
    )
}

/// Fields config with the given cache TTL and otherwise default tuning.
pub fn fields_config(ttl_secs: u64, single_flight: bool) -> FieldsConfig {
    FieldsConfig {
        rollup_cache_ttl: std::time::Duration::from_secs(ttl_secs),
        rollup_single_flight: single_flight,
        ..FieldsConfig::default()
    }
}

pub async fn setup_test_db() -> DbPool {
    db::init_memory().await.expect("Failed to create test database")
}

/// Test server plus the pool behind it, so tests can close it.
pub struct TestApp {
    pub server: TestServer,
    pub db: DbPool,
    pub state: AppState,
}

pub async fn test_app() -> TestApp {
    test_app_with(FieldsConfig::default()).await
}

pub async fn test_app_with(fields: FieldsConfig) -> TestApp {
    let db = setup_test_db().await;
    let state = AppState::with_pool(db.clone(), &fields);
    let app = Router::new()
        .merge(api::routes())
        .with_state(state.clone());

    TestApp {
        server: TestServer::new(app).unwrap(),
        db,
        state,
    }
}

impl TestApp {
    /// POST with the actor header; asserts the expected status.
    pub async fn post(&self, path: &str, body: Value, expected: StatusCode) -> Value {
        let (name, value) = actor_header();
        let response = self
            .server
            .post(path)
            .add_header(name, value)
            .json(&body)
            .await;
        response.assert_status(expected);
        response.json::<Value>()
    }

    pub async fn get(&self, path: &str) -> Value {
        let response = self.server.get(path).await;
        response.assert_status_ok();
        response.json::<Value>()
    }

    pub async fn delete(&self, path: &str, expected: StatusCode) {
        let (name, value) = actor_header();
        self.server
            .delete(path)
            .add_header(name, value)
            .await
            .assert_status(expected);
    }

    pub async fn create_project(&self, name: &str) -> i64 {
        let body = self
            .post(
                "/entities/projects",
                json!({ "name": name }),
                StatusCode::CREATED,
            )
            .await;
        body["id"].as_i64().unwrap()
    }

    pub async fn create_task(&self, title: &str, status: &str) -> i64 {
        let body = self
            .post(
                "/entities/tasks",
                json!({ "title": title, "status": status }),
                StatusCode::CREATED,
            )
            .await;
        body["id"].as_i64().unwrap()
    }

    pub async fn create_task_with(&self, body: Value) -> i64 {
        let body = self.post("/entities/tasks", body, StatusCode::CREATED).await;
        body["id"].as_i64().unwrap()
    }

    /// Create a relation from `source` to `target`.
    pub async fn link(
        &self,
        source: (&str, i64),
        target: (&str, i64),
        relation_type: &str,
        bidirectional: bool,
    ) -> Value {
        self.post(
            "/relations",
            json!({
                "source_type": source.0,
                "source_id": source.1,
                "target_type": target.0,
                "target_id": target.1,
                "relation_type": relation_type,
                "is_bidirectional": bidirectional,
            }),
            StatusCode::CREATED,
        )
        .await
    }
}
