//! Facet model: types, configuration, selections, and responses

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a facet aggregates values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetType {
    Term,
    Range,
    DateRange,
    Hierarchical,
}

/// Ordering of facet values in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetOrder {
    CountDesc,
    CountAsc,
    ValueAsc,
    ValueDesc,
    Custom,
}

/// Predefined date buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRangePeriod {
    Today,
    ThisWeek,
    ThisMonth,
    Last7Days,
    Last30Days,
    Last90Days,
    LastYear,
    Custom,
}

/// A single term or hierarchical facet value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    /// Display label
    pub value: String,
    /// Filter key
    pub key: String,
    pub count: usize,
    pub selected: bool,
    pub parent: Option<String>,
    pub children: Vec<FacetValue>,
}

impl FacetValue {
    pub fn new(value: impl Into<String>, key: impl Into<String>, count: usize) -> Self {
        Self {
            value: value.into(),
            key: key.into(),
            count,
            selected: false,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A date bucket with its count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRangeFacetValue {
    pub label: String,
    pub period: DateRangePeriod,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub count: usize,
    pub selected: bool,
}

/// One facet dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub label: String,
    pub facet_type: FacetType,
    pub values: Vec<FacetValue>,
    pub date_range_values: Vec<DateRangeFacetValue>,
    pub total_count: usize,
    pub order: FacetOrder,
    pub multi_select: bool,
}

/// How selected values combine within one facet; facets always AND together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionOperator {
    #[default]
    Or,
    And,
}

/// A user's selection on one facet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetSelection {
    pub facet_name: String,
    pub values: Vec<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub operator: SelectionOperator,
}

impl FacetSelection {
    pub fn terms(facet_name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            facet_name: facet_name.into(),
            values,
            ..Self::default()
        }
    }

    pub fn date_range(
        facet_name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            facet_name: facet_name.into(),
            date_start: Some(start),
            date_end: Some(end),
            ..Self::default()
        }
    }
}

/// Faceted-search behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetConfig {
    pub enabled_facets: Vec<String>,
    pub max_facet_values: usize,
    pub min_facet_count: usize,
    pub enable_hierarchical: bool,
    pub enable_date_facets: bool,
    pub cache_facets: bool,
    pub dynamic_ordering: bool,
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            enabled_facets: vec![
                "person_type".to_string(),
                "pgy_level".to_string(),
                "faculty_role".to_string(),
                "rotation_type".to_string(),
                "status".to_string(),
                "date_range".to_string(),
            ],
            max_facet_values: 10,
            min_facet_count: 1,
            enable_hierarchical: true,
            enable_date_facets: true,
            cache_facets: true,
            dynamic_ordering: true,
        }
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub entity_type: String,
    pub title: String,
    pub subtitle: String,
    pub score: f64,
    pub entity: Value,
}

/// Paginated results plus facets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetedSearchResponse {
    pub items: Vec<SearchResultItem>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub facets: Vec<Facet>,
    pub applied_facets: Vec<FacetSelection>,
    pub query: String,
    pub execution_time_ms: f64,
}
