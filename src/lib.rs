//! Trellis - Entity Relation & Derived-Field Engine
//!
//! Typed relations between projects, blocks, sections, tasks and subtasks,
//! plus lookup and rollup fields computed over those relations.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
