//! Lookup engine.
//!
//! A lookup surfaces a property of the entities related to an anchor,
//! reduced to one value (first, a list, a count...) and formatted for
//! display. Lookups are cheap and never cached.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::debug;

use crate::models::{EntityRef, FormatOptions, LookupAggregation, LookupDisplayFormat, LookupFieldDef};

use super::values::{
    format_fixed, get_path, locale_date, locale_datetime, to_date, to_number, value_to_string,
};
use super::RelationGraph;

/// Computes lookup field values.
#[derive(Clone)]
pub struct LookupEngine {
    graph: RelationGraph,
    default_max_items: usize,
}

impl LookupEngine {
    pub fn new(graph: RelationGraph, default_max_items: usize) -> Self {
        Self {
            graph,
            default_max_items,
        }
    }

    /// Compute a lookup for an anchor entity.
    ///
    /// With no related entities the result is the field's empty text, or
    /// `null` when it has none.
    pub async fn calculate(&self, def: &LookupFieldDef, anchor: EntityRef) -> Value {
        let related = self
            .graph
            .get_related_entities(anchor, Some(def.relation_type))
            .await;

        if related.is_empty() {
            debug!(field_id = def.id, anchor = %anchor, "Lookup has no related entities");
            return def
                .format_options
                .empty_text
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null);
        }

        let candidates: Vec<&Value> = related
            .iter()
            .filter_map(|r| get_path(&r.entity, &def.source_property))
            .collect();

        debug!(
            field_id = def.id,
            anchor = %anchor,
            related = related.len(),
            candidates = candidates.len(),
            "Lookup calculated"
        );

        reduce(def, &candidates, self.default_max_items)
    }
}

/// Reduce candidate values by the field's aggregation.
pub fn reduce(def: &LookupFieldDef, candidates: &[&Value], default_max_items: usize) -> Value {
    let format = def.display_format;
    let options = &def.format_options.0;
    let fmt = |v: &Value| format_value(v, format, options);

    match def.aggregation {
        LookupAggregation::First => candidates.first().map(|v| fmt(v)).unwrap_or(Value::Null),
        LookupAggregation::Last => candidates.last().map(|v| fmt(v)).unwrap_or(Value::Null),
        LookupAggregation::All => Value::Array(candidates.iter().map(|v| fmt(v)).collect()),
        LookupAggregation::Count => Value::from(candidates.len()),
        LookupAggregation::CommaList => {
            let max_items = options.max_items.unwrap_or(default_max_items);
            let shown: Vec<String> = candidates
                .iter()
                .take(max_items)
                .map(|v| value_to_string(&fmt(v)))
                .collect();

            let mut text = shown.join(", ");
            if candidates.len() > max_items {
                text.push_str(&format!(" +{} more", candidates.len() - max_items));
            }
            Value::String(text)
        }
        LookupAggregation::Unique => {
            let mut seen = HashSet::new();
            let unique = candidates
                .iter()
                .filter(|v| seen.insert(value_to_string(v)))
                .map(|v| fmt(v))
                .collect();
            Value::Array(unique)
        }
    }
}

/// Format a single value for display.
pub fn format_value(value: &Value, format: LookupDisplayFormat, options: &FormatOptions) -> Value {
    let prefix = options.prefix.as_deref().unwrap_or("");
    let suffix = options.suffix.as_deref().unwrap_or("");

    match format {
        LookupDisplayFormat::Date => Value::String(
            to_date(value)
                .map(|dt| locale_date(&dt))
                .unwrap_or_else(|| value_to_string(value)),
        ),
        LookupDisplayFormat::Datetime => Value::String(
            to_date(value)
                .map(|dt| locale_datetime(&dt))
                .unwrap_or_else(|| value_to_string(value)),
        ),
        LookupDisplayFormat::Number => {
            Value::String(format!("{}{}{}", prefix, value_to_string(value), suffix))
        }
        LookupDisplayFormat::Currency => {
            let prefix = options.prefix.as_deref().unwrap_or("$");
            let amount = to_number(value)
                .map(|n| format_fixed(n, 2))
                .unwrap_or_else(|| value_to_string(value));
            Value::String(format!("{}{}{}", prefix, amount, suffix))
        }
        LookupDisplayFormat::Percentage => Value::String(
            to_number(value)
                .map(|n| format!("{}%", format_fixed(n, 1)))
                .unwrap_or_else(|| value_to_string(value)),
        ),
        LookupDisplayFormat::ProgressBar | LookupDisplayFormat::Badge | LookupDisplayFormat::Link => {
            json!({"value": value, "type": format.as_str()})
        }
        LookupDisplayFormat::Text | LookupDisplayFormat::Avatar | LookupDisplayFormat::List => {
            Value::String(value_to_string(value))
        }
    }
}
