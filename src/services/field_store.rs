//! Field definition service.
//!
//! Lookup and rollup definitions are either concrete (owned by one
//! entity) or templates (no owner id, applying to every entity of the
//! kind). Listing for an entity merges the two tiers, with a concrete
//! definition shadowing a template of the same name.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::db::{self, DbPool};
use crate::models::{
    CreateLookupField, CreateRollupField, EntityKind, LookupFieldDef, RollupFieldDef,
};
use crate::{Error, Result};

/// Service for managing derived-field definitions.
#[derive(Clone)]
pub struct FieldStore {
    db: DbPool,
}

impl FieldStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Lookup fields
    // ========================================================================

    /// Create a lookup field definition.
    pub async fn create_lookup_field(&self, input: CreateLookupField) -> Result<LookupFieldDef> {
        validate_definition(&input.name, &input.source_property)?;
        if input.format_options.max_items == Some(0) {
            return Err(Error::Validation(
                "max_items must be at least 1".to_string(),
            ));
        }

        let def = db::create_lookup_field(&self.db, input).await?;
        info!(
            field_id = def.id,
            name = %def.name,
            kind = %def.owner_entity_kind,
            template = def.is_template(),
            "Lookup field created"
        );
        Ok(def)
    }

    /// Get a lookup field definition by id.
    pub async fn get_lookup_field(&self, id: i64) -> Result<LookupFieldDef> {
        db::get_lookup_field(&self.db, id).await
    }

    /// Lookup fields applying to an entity, or the kind's templates when
    /// no entity id is given.
    pub async fn get_lookup_fields(&self, kind: EntityKind, entity_id: Option<i64>) -> Vec<LookupFieldDef> {
        let templates = soft(db::list_lookup_fields(&self.db, kind, None).await, kind, "lookup");
        match entity_id {
            None => templates,
            Some(id) => {
                let concrete = soft(db::list_lookup_fields(&self.db, kind, Some(id)).await, kind, "lookup");
                merge_tiers(concrete, templates, |d| d.name.as_str())
            }
        }
    }

    /// Resolve a lookup field by name for one entity: its own definition
    /// first, then the kind's template.
    pub async fn resolve_lookup_field(
        &self,
        kind: EntityKind,
        entity_id: i64,
        name: &str,
    ) -> Option<LookupFieldDef> {
        self.get_lookup_fields(kind, Some(entity_id))
            .await
            .into_iter()
            .find(|d| d.name == name)
    }

    /// Delete a lookup field definition.
    pub async fn delete_lookup_field(&self, id: i64) -> Result<()> {
        db::delete_lookup_field(&self.db, id).await?;
        info!(field_id = id, "Lookup field deleted");
        Ok(())
    }

    // ========================================================================
    // Rollup fields
    // ========================================================================

    /// Create a rollup field definition.
    pub async fn create_rollup_field(&self, input: CreateRollupField) -> Result<RollupFieldDef> {
        validate_definition(&input.name, &input.source_property)?;
        if !input.progress_bar_max.is_finite() || input.progress_bar_max <= 0.0 {
            return Err(Error::Validation(
                "progress_bar_max must be a positive number".to_string(),
            ));
        }
        if input.decimal_places < 0 {
            return Err(Error::Validation(
                "decimal_places cannot be negative".to_string(),
            ));
        }

        let def = db::create_rollup_field(&self.db, input).await?;
        info!(
            field_id = def.id,
            name = %def.name,
            kind = %def.owner_entity_kind,
            function = ?def.aggregation_function,
            template = def.is_template(),
            "Rollup field created"
        );
        Ok(def)
    }

    /// Get a rollup field definition by id.
    pub async fn get_rollup_field(&self, id: i64) -> Result<RollupFieldDef> {
        db::get_rollup_field(&self.db, id).await
    }

    /// Rollup fields applying to an entity, or the kind's templates when
    /// no entity id is given.
    pub async fn get_rollup_fields(&self, kind: EntityKind, entity_id: Option<i64>) -> Vec<RollupFieldDef> {
        let templates = soft(db::list_rollup_fields(&self.db, kind, None).await, kind, "rollup");
        match entity_id {
            None => templates,
            Some(id) => {
                let concrete = soft(db::list_rollup_fields(&self.db, kind, Some(id)).await, kind, "rollup");
                merge_tiers(concrete, templates, |d| d.name.as_str())
            }
        }
    }

    /// Resolve a rollup field by name for one entity.
    pub async fn resolve_rollup_field(
        &self,
        kind: EntityKind,
        entity_id: i64,
        name: &str,
    ) -> Option<RollupFieldDef> {
        self.get_rollup_fields(kind, Some(entity_id))
            .await
            .into_iter()
            .find(|d| d.name == name)
    }

    /// Delete a rollup field definition.
    pub async fn delete_rollup_field(&self, id: i64) -> Result<()> {
        db::delete_rollup_field(&self.db, id).await?;
        info!(field_id = id, "Rollup field deleted");
        Ok(())
    }
}

fn validate_definition(name: &str, source_property: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Field name cannot be empty".to_string()));
    }
    if source_property.trim().is_empty() || source_property.split('.').any(str::is_empty) {
        return Err(Error::Validation(format!(
            "Invalid source property path: '{}'",
            source_property
        )));
    }
    Ok(())
}

fn soft<T>(result: Result<Vec<T>>, kind: EntityKind, field: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(kind = %kind, field, error = %e, "Field definition read failed, returning none");
        Vec::new()
    })
}

/// Concrete definitions followed by the templates they do not shadow.
fn merge_tiers<T>(concrete: Vec<T>, templates: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let shadowed: HashSet<String> = concrete.iter().map(|d| name(d).to_string()).collect();
    let mut merged = concrete;
    merged.extend(templates.into_iter().filter(|t| !shadowed.contains(name(t))));
    merged
}
