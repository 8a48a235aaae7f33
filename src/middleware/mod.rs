//! Middleware for Trellis.
//!
//! Identity is established upstream; requests carry the acting user's id
//! in the `X-Actor-Id` header. Mutating requests must present it so every
//! relation records who created it.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::Error;

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The user performing a write, injected into request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
}

/// Parse the actor id header, if present and well-formed.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    headers
        .get(ACTOR_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .map(|id| Actor { id })
}

/// Middleware that requires an actor on mutating requests.
///
/// Safe methods pass through untouched. For everything else the
/// `X-Actor-Id` header is parsed and `Actor` injected into request
/// extensions.
///
/// # Errors
///
/// Returns 401 Unauthorized if the header is missing or not an integer.
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware};
/// use trellis::middleware::require_actor;
///
/// let app = Router::new()
///     .route("/relations", post(create_relation))
///     .layer(middleware::from_fn(require_actor));
/// ```
pub async fn require_actor(mut req: Request<Body>, next: Next) -> Result<Response, Error> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    let actor = actor_from_headers(req.headers()).ok_or(Error::Unauthenticated)?;
    debug!(actor_id = actor.id, method = %req.method(), path = %req.uri().path(), "Actor authenticated");

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
