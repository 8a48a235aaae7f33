//! Service layer for Trellis.
//!
//! Contains the business logic over the database layer:
//! - EntityRegistry (kind-dispatched record access)
//! - RelationGraph (typed, optionally bidirectional edges)
//! - LookupEngine (surface related values)
//! - RollupEngine (aggregate related values, with a TTL cache)
//! - FieldStore (lookup/rollup definitions, concrete and template)

mod entity_store;
mod field_store;
pub mod lookup;
mod relation_graph;
pub mod rollup;
pub mod values;

pub use entity_store::{EntityAccessor, EntityRegistry, SqliteAccessor};
pub use field_store::FieldStore;
pub use lookup::LookupEngine;
pub use relation_graph::RelationGraph;
pub use rollup::RollupEngine;
