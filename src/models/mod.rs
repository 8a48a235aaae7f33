//! Data models for Trellis.
//!
//! Defines the core types used throughout the system: entity references,
//! relations, and lookup/rollup field definitions.

mod entity;
mod field;
mod relation;

pub use entity::*;
pub use field::*;
pub use relation::*;

use chrono::{DateTime, Utc};

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
