//! Application state for Trellis.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::config::FieldsConfig;
use crate::db::DbPool;
use crate::services::{EntityRegistry, FieldStore, LookupEngine, RelationGraph, RollupEngine};
use crate::{config, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Entity accessor registry.
    pub entities: Arc<EntityRegistry>,
    /// Relation graph service.
    pub relations: RelationGraph,
    /// Lookup field engine.
    pub lookups: LookupEngine,
    /// Rollup field engine.
    pub rollups: RollupEngine,
    /// Field definition service.
    pub fields: FieldStore,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        // Initialize database
        let db = crate::db::init_pool(&config.database.path).await?;

        // Initialize database schema
        crate::db::initialize_schema(&db).await?;

        Ok(Self::with_pool(db, &config.fields))
    }

    /// Build the state over an existing pool.
    pub fn with_pool(db: DbPool, fields: &FieldsConfig) -> Self {
        let entities = Arc::new(EntityRegistry::with_sqlite(db.clone()));
        let relations = RelationGraph::new(db.clone(), entities.clone());
        let lookups = LookupEngine::new(relations.clone(), fields.lookup_default_max_items);
        let rollups = RollupEngine::new(db.clone(), relations.clone(), fields);
        let field_store = FieldStore::new(db.clone());

        Self {
            db,
            entities,
            relations,
            lookups,
            rollups,
            fields: field_store,
        }
    }
}
