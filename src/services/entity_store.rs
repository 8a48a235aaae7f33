//! Entity registry for kind-dispatched record lookup.
//!
//! The derived-field engines never touch entity tables directly. They ask
//! the registry for the accessor of a kind and get back an untyped
//! [`Record`] that dot-paths can walk.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::db::{self, Block, DbPool, EntityRow, Project, Section, Subtask, Task};
use crate::models::{EntityKind, EntityRef, Record};
use crate::{Error, Result};

/// Read access to the records of one entity kind.
#[async_trait]
pub trait EntityAccessor: Send + Sync {
    /// The kind this accessor serves.
    fn kind(&self) -> EntityKind;

    /// Fetch a record by id. `Ok(None)` when the row does not exist.
    async fn fetch(&self, id: i64) -> Result<Option<Record>>;
}

/// Accessor reading one typed SQLite table.
pub struct SqliteAccessor<R> {
    db: DbPool,
    _row: PhantomData<fn() -> R>,
}

impl<R: EntityRow> SqliteAccessor<R> {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            _row: PhantomData,
        }
    }
}

#[async_trait]
impl<R: EntityRow> EntityAccessor for SqliteAccessor<R> {
    fn kind(&self) -> EntityKind {
        R::KIND
    }

    async fn fetch(&self, id: i64) -> Result<Option<Record>> {
        let row = db::get_entity_row::<R>(&self.db, id).await?;
        row.as_ref().map(to_record).transpose()
    }
}

/// Serialize a typed row into a record.
fn to_record<T: Serialize>(row: &T) -> Result<Record> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Internal(format!(
            "Entity row did not serialize to an object: {}",
            other
        ))),
    }
}

/// Registry of entity accessors keyed by kind.
#[derive(Default)]
pub struct EntityRegistry {
    accessors: HashMap<EntityKind, Arc<dyn EntityAccessor>>,
}

impl EntityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }

    /// Create a registry with a SQLite accessor for every kind.
    pub fn with_sqlite(db: DbPool) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(SqliteAccessor::<Project>::new(db.clone())));
        registry.register(Arc::new(SqliteAccessor::<Block>::new(db.clone())));
        registry.register(Arc::new(SqliteAccessor::<Section>::new(db.clone())));
        registry.register(Arc::new(SqliteAccessor::<Task>::new(db.clone())));
        registry.register(Arc::new(SqliteAccessor::<Subtask>::new(db)));

        registry
    }

    /// Register an accessor, replacing any previous one for its kind.
    pub fn register(&mut self, accessor: Arc<dyn EntityAccessor>) {
        self.accessors.insert(accessor.kind(), accessor);
    }

    /// Get the accessor for a kind.
    pub fn get(&self, kind: EntityKind) -> Option<Arc<dyn EntityAccessor>> {
        self.accessors.get(&kind).cloned()
    }

    /// Check if a kind has an accessor.
    pub fn has(&self, kind: EntityKind) -> bool {
        self.accessors.contains_key(&kind)
    }

    /// List registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.accessors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Fetch a record, or `None` when it is missing, unregistered or unreadable.
    pub async fn fetch(&self, entity: EntityRef) -> Option<Record> {
        let Some(accessor) = self.get(entity.kind) else {
            warn!(entity = %entity, "No accessor registered for entity kind");
            return None;
        };

        match accessor.fetch(entity.id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Entity fetch failed");
                None
            }
        }
    }
}
