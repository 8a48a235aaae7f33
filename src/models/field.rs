//! Derived-field definitions.
//!
//! Lookup and rollup fields are user-authored schema: they name a relation
//! type to walk, a property to read off each related entity, and how to
//! reduce and present the result. A definition without an owner entity id
//! is a template for every entity of its kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

use super::{EntityKind, RelationType};

// ============================================================================
// Lookup
// ============================================================================

/// How a lookup value is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LookupDisplayFormat {
    #[default]
    Text,
    Badge,
    Avatar,
    Date,
    Datetime,
    ProgressBar,
    Link,
    List,
    Number,
    Currency,
    Percentage,
}

impl LookupDisplayFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Badge => "badge",
            Self::Avatar => "avatar",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::ProgressBar => "progress_bar",
            Self::Link => "link",
            Self::List => "list",
            Self::Number => "number",
            Self::Currency => "currency",
            Self::Percentage => "percentage",
        }
    }
}

/// How the values of several related entities reduce to one lookup value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LookupAggregation {
    #[default]
    First,
    Last,
    All,
    Count,
    CommaList,
    Unique,
}

/// Presentation knobs for lookups. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Shown when no related entity exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Lookup field definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LookupFieldDef {
    pub id: i64,
    pub owner_entity_kind: EntityKind,
    /// `None` marks a template for every entity of the kind
    pub owner_entity_id: Option<i64>,
    pub name: String,
    pub display_name: String,
    pub relation_type: RelationType,
    pub source_property: String,
    pub display_format: LookupDisplayFormat,
    pub aggregation: LookupAggregation,
    pub format_options: Json<FormatOptions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LookupFieldDef {
    pub fn is_template(&self) -> bool {
        self.owner_entity_id.is_none()
    }
}

/// Request model for creating a lookup field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLookupField {
    pub owner_entity_kind: EntityKind,
    #[serde(default)]
    pub owner_entity_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub relation_type: RelationType,
    pub source_property: String,
    #[serde(default)]
    pub display_format: LookupDisplayFormat,
    #[serde(default)]
    pub aggregation: LookupAggregation,
    #[serde(default)]
    pub format_options: FormatOptions,
}

// ============================================================================
// Rollup
// ============================================================================

/// The twenty rollup reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AggregationFunction {
    Count,
    CountValues,
    CountUnique,
    CountChecked,
    CountUnchecked,
    Sum,
    Average,
    Median,
    Min,
    Max,
    Range,
    PercentEmpty,
    PercentNotEmpty,
    PercentChecked,
    PercentUnchecked,
    EarliestDate,
    LatestDate,
    DateRangeDays,
    ShowOriginal,
    Concatenate,
}

impl AggregationFunction {
    pub fn all() -> &'static [AggregationFunction] {
        use AggregationFunction::*;
        &[
            Count,
            CountValues,
            CountUnique,
            CountChecked,
            CountUnchecked,
            Sum,
            Average,
            Median,
            Min,
            Max,
            Range,
            PercentEmpty,
            PercentNotEmpty,
            PercentChecked,
            PercentUnchecked,
            EarliestDate,
            LatestDate,
            DateRangeDays,
            ShowOriginal,
            Concatenate,
        ]
    }

    /// Percentages are rounded to the field's decimal places.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            Self::PercentEmpty | Self::PercentNotEmpty | Self::PercentChecked | Self::PercentUnchecked
        )
    }
}

/// How a rollup aggregate is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RollupDisplayFormat {
    #[default]
    Number,
    Percentage,
    Currency,
    /// Value in hours, shown as `Hh Mm`
    Duration,
    Date,
    ProgressBar,
    Text,
    /// Value over the related-entity count
    Fraction,
}

/// Comparison applied by a rollup filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    IsEmpty,
    IsNotEmpty,
    IsChecked,
    IsUnchecked,
}

/// One conjunct of a rollup filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Dot-path into the related entity
    pub property: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Rollup field definition row, including its cache columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RollupFieldDef {
    pub id: i64,
    pub owner_entity_kind: EntityKind,
    pub owner_entity_id: Option<i64>,
    pub name: String,
    pub display_name: String,
    pub source_relation_type: RelationType,
    pub source_property: String,
    pub aggregation_function: AggregationFunction,
    pub filter_conditions: Json<Vec<FilterCondition>>,
    pub display_format: RollupDisplayFormat,
    pub decimal_places: i64,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub progress_bar_max: f64,
    pub progress_bar_color: Option<String>,
    /// JSON-encoded [`RollupResult`]
    pub cached_value: Option<String>,
    pub last_calculated_at: Option<DateTime<Utc>>,
    pub cache_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RollupFieldDef {
    pub fn is_template(&self) -> bool {
        self.owner_entity_id.is_none()
    }

    /// Decimal places clamped to a sane formatting range.
    pub fn decimals(&self) -> usize {
        self.decimal_places.clamp(0, 10) as usize
    }
}

/// Request model for creating a rollup field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRollupField {
    pub owner_entity_kind: EntityKind,
    #[serde(default)]
    pub owner_entity_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub source_relation_type: RelationType,
    pub source_property: String,
    pub aggregation_function: AggregationFunction,
    #[serde(default)]
    pub filter_conditions: Vec<FilterCondition>,
    #[serde(default)]
    pub display_format: RollupDisplayFormat,
    #[serde(default)]
    pub decimal_places: i64,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default = "default_progress_bar_max")]
    pub progress_bar_max: f64,
    #[serde(default)]
    pub progress_bar_color: Option<String>,
}

fn default_progress_bar_max() -> f64 {
    100.0
}

/// A computed rollup: the raw aggregate and its display string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupResult {
    pub value: Value,
    pub formatted: String,
}
