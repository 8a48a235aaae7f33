//! API Routes for Trellis
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain and apply appropriate middleware.

mod entities;
mod lookups;
mod relations;
mod rollups;
pub mod status;

use axum::Router;

use crate::middleware::require_actor;
use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /entities/* - Project hierarchy CRUD
/// - /relations/* - Relation graph
/// - /lookup-fields/* - Lookup definitions and values
/// - /rollup-fields/* - Rollup definitions, values and cache
/// - /health - Health check (public)
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health endpoint (public)
        .merge(status::routes())
        // Domain routes; writes need an actor
        .merge(protected_routes())
}

/// Domain routes. Mutating requests require an `X-Actor-Id` header.
fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/entities", entities::routes())
        .nest("/relations", relations::routes())
        .nest("/lookup-fields", lookups::routes())
        .nest("/rollup-fields", rollups::routes())
        .layer(axum::middleware::from_fn(require_actor))
}
