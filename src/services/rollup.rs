//! Rollup engine.
//!
//! A rollup aggregates a property across the entities related to an
//! anchor: filter, extract, reduce with one of twenty functions, format.
//! Results computed for a definition's owner are written to its cache
//! columns with a TTL; the engine itself always computes fresh, and
//! callers decide whether to serve from cache via [`RollupEngine::value_or_recompute`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::config::FieldsConfig;
use crate::db::{self, DbPool};
use crate::models::{
    AggregationFunction, EntityRef, FilterCondition, FilterOperator, Record, RollupDisplayFormat,
    RollupFieldDef, RollupResult,
};
use crate::Result;

use super::values::{
    format_fixed, get_path, iso_date, is_checked, is_empty, locale_date, number_value, round_to,
    strict_equals, to_date, to_number, value_to_string,
};
use super::RelationGraph;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Computes and caches rollup field values.
#[derive(Clone)]
pub struct RollupEngine {
    db: DbPool,
    graph: RelationGraph,
    cache_ttl: Duration,
    flights: Option<Arc<RecomputeLocks>>,
}

impl RollupEngine {
    pub fn new(db: DbPool, graph: RelationGraph, config: &FieldsConfig) -> Self {
        let cache_ttl = Duration::from_std(config.rollup_cache_ttl)
            .unwrap_or_else(|_| Duration::seconds(300));
        let flights = config
            .rollup_single_flight
            .then(|| Arc::new(RecomputeLocks::default()));

        Self {
            db,
            graph,
            cache_ttl,
            flights,
        }
    }

    /// Compute a rollup for an anchor entity.
    ///
    /// The field's cache is refreshed only when the anchor owns the
    /// definition. A failed cache write is logged; the computed result is
    /// still returned.
    pub async fn calculate(&self, def: &RollupFieldDef, anchor: EntityRef) -> RollupResult {
        let related = self
            .graph
            .get_related_entities(anchor, Some(def.source_relation_type))
            .await;
        let records: Vec<&Record> = related.iter().map(|r| &r.entity).collect();

        let result = compute(def, &records);

        debug!(
            field_id = def.id,
            anchor = %anchor,
            related = records.len(),
            function = ?def.aggregation_function,
            formatted = %result.formatted,
            "Rollup calculated"
        );

        if serves_from_cache(def, anchor) {
            self.store(def.id, &result).await;
        }
        result
    }

    /// The stored result of a field, if present and not yet expired.
    pub async fn get_cached_value(&self, field_id: i64) -> Option<RollupResult> {
        match db::get_rollup_field(&self.db, field_id).await {
            Ok(def) => fresh_cached(&def, Utc::now()),
            Err(e) => {
                debug!(field_id, error = %e, "Rollup cache read failed");
                None
            }
        }
    }

    /// Drop a field's cached result.
    pub async fn invalidate_cache(&self, field_id: i64) -> Result<()> {
        db::clear_rollup_cache(&self.db, field_id).await?;
        debug!(field_id, "Rollup cache invalidated");
        Ok(())
    }

    /// Serve the cached result when fresh, otherwise recompute.
    ///
    /// The cache columns live on the definition row, so only a concrete
    /// definition read for its own owner is served from cache; templates
    /// always recompute.
    pub async fn value_or_recompute(&self, def: &RollupFieldDef, anchor: EntityRef) -> RollupResult {
        if !serves_from_cache(def, anchor) {
            return self.calculate(def, anchor).await;
        }

        if let Some(hit) = fresh_cached(def, Utc::now()) {
            return hit;
        }

        let Some(locks) = &self.flights else {
            return self.calculate(def, anchor).await;
        };

        let guard = locks.acquire(def.id).await;
        // Another recompute may have landed while we waited.
        let result = match self.get_cached_value(def.id).await {
            Some(hit) => hit,
            None => self.calculate(def, anchor).await,
        };
        drop(guard);
        locks.release(def.id);

        result
    }

    async fn store(&self, field_id: i64, result: &RollupResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(field_id, error = %e, "Failed to encode rollup result");
                return;
            }
        };

        let now = Utc::now();
        if let Err(e) =
            db::write_rollup_cache(&self.db, field_id, &payload, now, now + self.cache_ttl).await
        {
            warn!(field_id, error = %e, "Failed to write rollup cache");
        }
    }
}

fn serves_from_cache(def: &RollupFieldDef, anchor: EntityRef) -> bool {
    def.owner_entity_kind == anchor.kind && def.owner_entity_id == Some(anchor.id)
}

/// Decode a definition's cached result if it expires after `now`.
pub fn fresh_cached(def: &RollupFieldDef, now: DateTime<Utc>) -> Option<RollupResult> {
    let expires_at = def.cache_expires_at?;
    if expires_at <= now {
        return None;
    }
    serde_json::from_str(def.cached_value.as_deref()?).ok()
}

/// Per-field recompute locks for single-flight mode.
#[derive(Default)]
struct RecomputeLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RecomputeLocks {
    async fn acquire(&self, field_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(field_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Forget a field's lock once nobody holds or awaits it.
    fn release(&self, field_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&field_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&field_id);
        }
    }
}

// ============================================================================
// Computation
// ============================================================================

/// Filter, extract, aggregate and format over already-resolved records.
pub fn compute(def: &RollupFieldDef, records: &[&Record]) -> RollupResult {
    let conditions = &def.filter_conditions.0;

    let (values, total) = if conditions.is_empty() {
        let values: Vec<Value> = records
            .iter()
            .filter_map(|r| get_path(r, &def.source_property).cloned())
            .collect();
        (values, records.len())
    } else {
        let passing: Vec<&Record> = records
            .iter()
            .copied()
            .filter(|r| matches_all(r, conditions))
            .collect();
        let values: Vec<Value> = passing
            .iter()
            .map(|r| get_path(r, &def.source_property).cloned().unwrap_or(Value::Null))
            .collect();
        (values, passing.len())
    };

    let value = aggregate(def.aggregation_function, &values, total, def.decimals());
    let formatted = format_rollup(def, &value, total);

    RollupResult { value, formatted }
}

/// Whether a record satisfies every condition.
pub fn matches_all(record: &Record, conditions: &[FilterCondition]) -> bool {
    conditions.iter().all(|c| matches_condition(record, c))
}

/// Evaluate one filter condition against a record.
pub fn matches_condition(record: &Record, condition: &FilterCondition) -> bool {
    let actual = get_path(record, &condition.property);
    let expected = condition.value.as_ref();

    match condition.operator {
        FilterOperator::Equals => values_equal(actual, expected),
        FilterOperator::NotEquals => !values_equal(actual, expected),
        FilterOperator::Contains => contains(actual, expected),
        FilterOperator::NotContains => !contains(actual, expected),
        FilterOperator::GreaterThan => compare(actual, expected, |a, b| a > b),
        FilterOperator::LessThan => compare(actual, expected, |a, b| a < b),
        FilterOperator::GreaterOrEqual => compare(actual, expected, |a, b| a >= b),
        FilterOperator::LessOrEqual => compare(actual, expected, |a, b| a <= b),
        FilterOperator::IsEmpty => is_empty(actual),
        FilterOperator::IsNotEmpty => !is_empty(actual),
        FilterOperator::IsChecked => is_checked(actual),
        FilterOperator::IsUnchecked => !is_checked(actual),
    }
}

fn values_equal(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (None, None) | (None, Some(Value::Null)) => true,
        (Some(a), Some(b)) => strict_equals(a, b),
        _ => false,
    }
}

fn contains(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (Some(a), Some(b)) => value_to_string(a).contains(&value_to_string(b)),
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: Option<&Value>, op: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(to_number), expected.and_then(to_number)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Reduce extracted values with an aggregation function.
///
/// `total` is the number of related entities that passed filtering; the
/// complement functions and percentages are computed against it.
pub fn aggregate(function: AggregationFunction, values: &[Value], total: usize, decimals: usize) -> Value {
    use AggregationFunction::*;

    let percent = |matching: usize| {
        if total == 0 {
            Value::from(0)
        } else {
            number_value(round_to(matching as f64 / total as f64 * 100.0, decimals))
        }
    };
    let checked = || values.iter().filter(|v| is_checked(Some(*v))).count();
    let filled = || values.iter().filter(|v| !is_empty(Some(*v))).count();

    match function {
        Count => Value::from(total),
        CountValues => Value::from(filled()),
        CountUnique => {
            let distinct: HashSet<String> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(value_to_string)
                .collect();
            Value::from(distinct.len())
        }
        CountChecked => Value::from(checked()),
        CountUnchecked => Value::from(total.saturating_sub(checked())),
        Sum | Average | Median | Min | Max | Range => {
            let numbers: Vec<f64> = values.iter().filter_map(to_number).collect();
            number_value(numeric_stat(function, numbers))
        }
        PercentEmpty => percent(total.saturating_sub(filled())),
        PercentNotEmpty => percent(filled()),
        PercentChecked => percent(checked()),
        PercentUnchecked => percent(total.saturating_sub(checked())),
        EarliestDate | LatestDate | DateRangeDays => {
            let dates: Vec<DateTime<Utc>> = values.iter().filter_map(to_date).collect();
            let earliest = dates.iter().min();
            let latest = dates.iter().max();
            match function {
                EarliestDate => earliest.map(|d| Value::String(iso_date(d))).unwrap_or(Value::Null),
                LatestDate => latest.map(|d| Value::String(iso_date(d))).unwrap_or(Value::Null),
                _ => match (earliest, latest) {
                    (Some(min), Some(max)) if dates.len() >= 2 => {
                        let ms = (*max - *min).num_milliseconds() as f64;
                        number_value((ms / MS_PER_DAY).round())
                    }
                    _ => Value::from(0),
                },
            }
        }
        ShowOriginal => Value::Array(values.to_vec()),
        Concatenate => Value::String(
            values
                .iter()
                .filter(|v| !v.is_null())
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

fn numeric_stat(function: AggregationFunction, mut numbers: Vec<f64>) -> f64 {
    if numbers.is_empty() {
        return 0.0;
    }

    let sum: f64 = numbers.iter().sum();
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    match function {
        AggregationFunction::Sum => sum,
        AggregationFunction::Average => sum / numbers.len() as f64,
        AggregationFunction::Median => {
            numbers.sort_by(|a, b| a.total_cmp(b));
            let mid = numbers.len() / 2;
            if numbers.len() % 2 == 0 {
                (numbers[mid - 1] + numbers[mid]) / 2.0
            } else {
                numbers[mid]
            }
        }
        AggregationFunction::Min => min,
        AggregationFunction::Max => max,
        AggregationFunction::Range => max - min,
        _ => 0.0,
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Render an aggregate per the field's display settings.
pub fn format_rollup(def: &RollupFieldDef, value: &Value, total: usize) -> String {
    if value.is_null() {
        return String::new();
    }

    let decimals = def.decimals();
    let prefix = def.prefix.as_deref().unwrap_or("");
    let suffix = def.suffix.as_deref().unwrap_or("");
    let number = scalar_number(value);

    match def.display_format {
        RollupDisplayFormat::Number => match number {
            Some(n) => format!("{}{}{}", prefix, format_fixed(n, decimals), suffix),
            None => display_text(value),
        },
        RollupDisplayFormat::Percentage => match number {
            Some(n) => format!("{}{}%{}", prefix, format_fixed(n, decimals), suffix),
            None => display_text(value),
        },
        RollupDisplayFormat::Currency => match number {
            Some(n) => {
                let prefix = def.prefix.as_deref().unwrap_or("$");
                format!("{}{}{}", prefix, format_fixed(n, decimals), suffix)
            }
            None => display_text(value),
        },
        RollupDisplayFormat::Duration => match number {
            Some(hours) => {
                let minutes = (hours * 60.0).round() as i64;
                format!("{}h {}m", minutes.div_euclid(60), minutes.rem_euclid(60))
            }
            None => display_text(value),
        },
        RollupDisplayFormat::Date => to_date(value)
            .map(|dt| locale_date(&dt))
            .unwrap_or_else(|| display_text(value)),
        RollupDisplayFormat::ProgressBar => match number {
            Some(n) if def.progress_bar_max > 0.0 => {
                format!("{}%", (n / def.progress_bar_max * 100.0).round() as i64)
            }
            Some(_) => "0%".to_string(),
            None => display_text(value),
        },
        RollupDisplayFormat::Fraction => format!("{}/{}", display_text(value), total),
        RollupDisplayFormat::Text => display_text(value),
    }
}

fn scalar_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        other => value_to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now, EntityKind, RelationType};
    use rstest::rstest;
    use serde_json::json;
    use sqlx::types::Json;

    fn def(function: AggregationFunction, format: RollupDisplayFormat, decimals: i64) -> RollupFieldDef {
        RollupFieldDef {
            id: 1,
            owner_entity_kind: EntityKind::Project,
            owner_entity_id: Some(1),
            name: "rollup".to_string(),
            display_name: "Rollup".to_string(),
            source_relation_type: RelationType::ParentChild,
            source_property: "status".to_string(),
            aggregation_function: function,
            filter_conditions: Json(Vec::new()),
            display_format: format,
            decimal_places: decimals,
            prefix: None,
            suffix: None,
            progress_bar_max: 100.0,
            progress_bar_color: None,
            cached_value: None,
            last_calculated_at: None,
            cache_expires_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => panic!("record must be an object"),
            })
            .collect()
    }

    fn run(def: &RollupFieldDef, records: &[Record]) -> RollupResult {
        let refs: Vec<&Record> = records.iter().collect();
        compute(def, &refs)
    }

    #[test]
    fn test_percent_checked_scenario() {
        let d = def(AggregationFunction::PercentChecked, RollupDisplayFormat::Percentage, 1);
        let rs = records(vec![
            json!({"status": "completed"}),
            json!({"status": "completed"}),
            json!({"status": "in_progress"}),
        ]);

        let result = run(&d, &rs);
        assert_eq!(result.value, json!(66.7));
        assert_eq!(result.formatted, "66.7%");
    }

    #[test]
    fn test_count_unique_scenario() {
        let d = def(AggregationFunction::CountUnique, RollupDisplayFormat::Number, 0);
        let rs = records(vec![
            json!({"status": "a"}),
            json!({"status": "b"}),
            json!({"status": "a"}),
            json!({"status": "c"}),
        ]);
        assert_eq!(run(&d, &rs).value, json!(3));
    }

    #[test]
    fn test_zero_values_on_empty_input() {
        for function in AggregationFunction::all() {
            let value = aggregate(*function, &[], 0, 1);
            let expected = match function {
                AggregationFunction::EarliestDate | AggregationFunction::LatestDate => Value::Null,
                AggregationFunction::ShowOriginal => json!([]),
                AggregationFunction::Concatenate => json!(""),
                _ => json!(0),
            };
            assert_eq!(value, expected, "zero value of {:?}", function);
        }
    }

    #[rstest]
    #[case(AggregationFunction::Count, json!(5))]
    #[case(AggregationFunction::CountValues, json!(4))]
    #[case(AggregationFunction::Sum, json!(7))]
    #[case(AggregationFunction::Median, json!(2))]
    #[case(AggregationFunction::Min, json!(1))]
    #[case(AggregationFunction::Max, json!(4))]
    #[case(AggregationFunction::Range, json!(3))]
    #[case(AggregationFunction::PercentEmpty, json!(20))]
    #[case(AggregationFunction::PercentNotEmpty, json!(80))]
    #[case(AggregationFunction::Concatenate, json!("1, 2, , 4, x"))]
    fn test_mixed_value_aggregates(#[case] function: AggregationFunction, #[case] expected: Value) {
        // "" and "x" are not numeric; only "" is empty
        let values = vec![json!(1), json!("2"), json!(""), json!(4), json!("x")];
        assert_eq!(aggregate(function, &values, 5, 0), expected);
    }

    #[test]
    fn test_average_and_even_median() {
        let values = vec![json!(1), json!(2), json!(4), json!(5)];
        assert_eq!(aggregate(AggregationFunction::Average, &values, 4, 0), json!(3));
        assert_eq!(aggregate(AggregationFunction::Median, &values, 4, 0), json!(3));
        let values = vec![json!(1), json!(2)];
        assert_eq!(aggregate(AggregationFunction::Average, &values, 2, 0), json!(1.5));
    }

    #[test]
    fn test_checked_complements_use_total() {
        let values = vec![json!(true), json!("done"), json!(false)];
        assert_eq!(aggregate(AggregationFunction::CountChecked, &values, 4, 0), json!(2));
        assert_eq!(aggregate(AggregationFunction::CountUnchecked, &values, 4, 0), json!(2));
        assert_eq!(aggregate(AggregationFunction::PercentUnchecked, &values, 4, 0), json!(50));
    }

    #[test]
    fn test_date_aggregates() {
        let values = vec![json!("2024-01-10"), json!("2024-01-01"), json!("not a date"), json!("2024-01-31")];
        assert_eq!(
            aggregate(AggregationFunction::EarliestDate, &values, 4, 0),
            json!("2024-01-01T00:00:00.000Z")
        );
        assert_eq!(
            aggregate(AggregationFunction::LatestDate, &values, 4, 0),
            json!("2024-01-31T00:00:00.000Z")
        );
        assert_eq!(aggregate(AggregationFunction::DateRangeDays, &values, 4, 0), json!(30));
        assert_eq!(
            aggregate(AggregationFunction::DateRangeDays, &values[..1], 1, 0),
            json!(0)
        );
    }

    #[test]
    fn test_show_original_keeps_nulls_under_filters() {
        let mut d = def(AggregationFunction::ShowOriginal, RollupDisplayFormat::Text, 0);
        d.source_property = "estimate".to_string();
        d.filter_conditions = Json(vec![FilterCondition {
            property: "status".to_string(),
            operator: FilterOperator::NotEquals,
            value: Some(json!("done")),
        }]);
        let rs = records(vec![
            json!({"status": "todo", "estimate": 3}),
            json!({"status": "todo"}),
            json!({"status": "done", "estimate": 8}),
        ]);

        let result = run(&d, &rs);
        assert_eq!(result.value, json!([3, null]));
        assert_eq!(result.formatted, "3, ");
    }

    #[test]
    fn test_filter_conjunction_and_monotonicity() {
        let rs = records(vec![
            json!({"status": "todo", "hours": 2, "tags": "backend,api"}),
            json!({"status": "todo", "hours": 5, "tags": "frontend"}),
            json!({"status": "done", "hours": 8, "tags": "backend"}),
            json!({"status": "todo", "hours": "n/a", "tags": ""}),
        ]);

        let conditions = [
            FilterCondition {
                property: "status".to_string(),
                operator: FilterOperator::Equals,
                value: Some(json!("todo")),
            },
            FilterCondition {
                property: "hours".to_string(),
                operator: FilterOperator::GreaterOrEqual,
                value: Some(json!(2)),
            },
            FilterCondition {
                property: "tags".to_string(),
                operator: FilterOperator::Contains,
                value: Some(json!("backend")),
            },
        ];

        let mut d = def(AggregationFunction::Count, RollupDisplayFormat::Number, 0);
        let mut previous = rs.len() as i64;
        let mut counts = Vec::new();
        for i in 1..=conditions.len() {
            d.filter_conditions = Json(conditions[..i].to_vec());
            let count = run(&d, &rs).value.as_i64().unwrap();
            assert!(count <= previous);
            previous = count;
            counts.push(count);
        }
        assert_eq!(counts, vec![3, 2, 1]);

        for r in &rs {
            let all = matches_all(r, &conditions);
            let each = conditions.iter().all(|c| matches_condition(r, c));
            assert_eq!(all, each);
        }
    }

    #[rstest]
    #[case(FilterOperator::Equals, json!(3), true)]
    #[case(FilterOperator::Equals, json!("3"), false)]
    #[case(FilterOperator::NotEquals, json!(4), true)]
    #[case(FilterOperator::GreaterThan, json!(2), true)]
    #[case(FilterOperator::LessThan, json!("10"), true)]
    #[case(FilterOperator::LessOrEqual, json!(3), true)]
    #[case(FilterOperator::GreaterThan, json!("abc"), false)]
    fn test_numeric_operators(#[case] operator: FilterOperator, #[case] value: Value, #[case] expected: bool) {
        let rs = records(vec![json!({"points": 3})]);
        let r = &rs[0];
        let condition = FilterCondition {
            property: "points".to_string(),
            operator,
            value: Some(value),
        };
        assert_eq!(matches_condition(r, &condition), expected);
    }

    #[test]
    fn test_presence_operators() {
        let rs = records(vec![json!({"title": "", "done": "completed"})]);
        let r = &rs[0];
        let check = |property: &str, operator| {
            matches_condition(r, &FilterCondition {
                property: property.to_string(),
                operator,
                value: None,
            })
        };

        assert!(check("title", FilterOperator::IsEmpty));
        assert!(check("missing", FilterOperator::IsEmpty));
        assert!(!check("done", FilterOperator::IsEmpty));
        assert!(check("done", FilterOperator::IsChecked));
        assert!(check("missing", FilterOperator::IsUnchecked));
        assert!(check("missing", FilterOperator::NotContains));
    }

    #[rstest]
    #[case(RollupDisplayFormat::Number, json!(12.346), 2, "12.35")]
    #[case(RollupDisplayFormat::Currency, json!(1250), 2, "$1250.00")]
    #[case(RollupDisplayFormat::Percentage, json!(40), 0, "40%")]
    #[case(RollupDisplayFormat::Duration, json!(2.5), 0, "2h 30m")]
    #[case(RollupDisplayFormat::Date, json!("2024-02-09T00:00:00.000Z"), 0, "2/9/2024")]
    #[case(RollupDisplayFormat::ProgressBar, json!(45), 0, "45%")]
    #[case(RollupDisplayFormat::Fraction, json!(3), 0, "3/4")]
    #[case(RollupDisplayFormat::Text, json!(["a", "b"]), 0, "a, b")]
    #[case(RollupDisplayFormat::Number, json!("mixed"), 0, "mixed")]
    #[case(RollupDisplayFormat::Number, Value::Null, 0, "")]
    fn test_format_rollup(
        #[case] format: RollupDisplayFormat,
        #[case] value: Value,
        #[case] decimals: i64,
        #[case] expected: &str,
    ) {
        let d = def(AggregationFunction::Sum, format, decimals);
        assert_eq!(format_rollup(&d, &value, 4), expected);
    }

    #[test]
    fn test_prefix_suffix_and_progress_max() {
        let mut d = def(AggregationFunction::Sum, RollupDisplayFormat::Number, 1);
        d.prefix = Some("~".to_string());
        d.suffix = Some(" pts".to_string());
        assert_eq!(format_rollup(&d, &json!(7), 0), "~7.0 pts");

        d.display_format = RollupDisplayFormat::ProgressBar;
        d.progress_bar_max = 40.0;
        assert_eq!(format_rollup(&d, &json!(10), 0), "25%");
    }

    #[test]
    fn test_fresh_cached_respects_expiry() {
        let mut d = def(AggregationFunction::Count, RollupDisplayFormat::Number, 0);
        let stored = RollupResult {
            value: json!(2),
            formatted: "2".to_string(),
        };
        d.cached_value = Some(serde_json::to_string(&stored).unwrap());

        let t = now();
        d.cache_expires_at = Some(t + Duration::minutes(5));
        assert_eq!(fresh_cached(&d, t), Some(stored.clone()));
        assert_eq!(fresh_cached(&d, t + Duration::minutes(5)), None);

        d.cache_expires_at = None;
        assert_eq!(fresh_cached(&d, t), None);
    }

    #[tokio::test]
    async fn test_recompute_lock_released_when_idle() {
        let locks = RecomputeLocks::default();

        let guard = locks.acquire(7).await;
        drop(guard);
        locks.release(7);

        assert!(locks.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recompute_lock_kept_while_held() {
        let locks = RecomputeLocks::default();

        let first = locks.acquire(7).await;
        let second = locks.acquire(8).await;
        drop(first);
        locks.release(7);
        locks.release(8);

        let held: Vec<i64> = locks.locks.lock().unwrap().keys().copied().collect();
        assert_eq!(held, vec![8]);
        drop(second);
    }
}
