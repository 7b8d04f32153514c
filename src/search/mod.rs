//! Faceted search over scheduling entities
//!
//! Substring search per entity type, filtered by facet selections, with
//! dynamic facet counts aggregated over the result set. Responses cache
//! under a canonical key; analytics update after every search.

pub mod analytics;
pub mod cache;
pub mod facet;

pub use analytics::{FacetAnalytics, FacetAnalyticsTracker};
pub use cache::{cache_key, CacheMetrics, SearchCache};
pub use facet::{
    DateRangeFacetValue, DateRangePeriod, Facet, FacetConfig, FacetOrder, FacetSelection,
    FacetType, FacetValue, FacetedSearchResponse, SearchResultItem, SelectionOperator,
};

use crate::config::SearchConfig;
use crate::domain::FacultyRole;
use crate::store::Datastore;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::debug;

/// Entity types served by the search
pub const ENTITY_TYPES: &[&str] = &["person", "rotation", "procedure", "assignment", "swap"];

/// The faceted search service
pub struct FacetedSearchService {
    store: Arc<dyn Datastore>,
    config: SearchConfig,
    cache: SearchCache,
    analytics: FacetAnalyticsTracker,
    query_counts: DashMap<String, u64>,
}

impl FacetedSearchService {
    pub fn new(store: Arc<dyn Datastore>, config: SearchConfig) -> Self {
        let cache = SearchCache::new(
            config.cache_capacity,
            StdDuration::from_secs(config.cache_ttl_secs),
        );
        Self {
            store,
            config,
            cache,
            analytics: FacetAnalyticsTracker::new(),
            query_counts: DashMap::new(),
        }
    }

    /// Execute a faceted search
    pub fn search_with_facets(
        &self,
        query: &str,
        entity_types: Option<Vec<String>>,
        selections: Vec<FacetSelection>,
        facet_config: FacetConfig,
        page: usize,
        page_size: usize,
    ) -> FacetedSearchResponse {
        let started = Instant::now();
        let entity_types =
            entity_types.unwrap_or_else(|| ENTITY_TYPES.iter().map(|s| s.to_string()).collect());

        let key = cache_key(query, &entity_types, &selections);
        if facet_config.cache_facets {
            if let Some(cached) = self.cache.get(&key) {
                debug!(query, "facet cache hit");
                return cached;
            }
        }

        let results = self.execute_search(query, &entity_types, &selections);
        let facets = self.generate_facets(&results, &facet_config, &selections);

        let total = results.len();
        let page = page.max(1);
        let start_index = (page - 1) * page_size;
        let items: Vec<SearchResultItem> = results
            .into_iter()
            .skip(start_index)
            .take(page_size)
            .collect();

        let response = FacetedSearchResponse {
            items,
            total,
            page,
            page_size,
            total_pages: if page_size > 0 { total.div_ceil(page_size) } else { 0 },
            facets,
            applied_facets: selections.clone(),
            query: query.to_string(),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        if facet_config.cache_facets {
            self.cache.put(key, response.clone());
        }
        self.analytics.record_usage(&selections, total, total);

        response
    }

    /// Cache hit/miss counters
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Per-type backing query counts (diagnostic; cached hits skip these)
    pub fn entity_query_counts(&self) -> HashMap<String, u64> {
        self.query_counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Facet usage analytics snapshot
    pub fn facet_analytics(&self, facet_name: Option<&str>) -> Vec<FacetAnalytics> {
        self.analytics.snapshot(facet_name)
    }

    fn count_query(&self, entity_type: &str) {
        *self.query_counts.entry(entity_type.to_string()).or_insert(0) += 1;
    }

    fn execute_search(
        &self,
        query: &str,
        entity_types: &[String],
        selections: &[FacetSelection],
    ) -> Vec<SearchResultItem> {
        let mut results = Vec::new();
        for entity_type in entity_types {
            match entity_type.as_str() {
                "person" => results.extend(self.search_persons(query, selections)),
                "rotation" => results.extend(self.search_rotations(query, selections)),
                "procedure" => results.extend(self.search_procedures(query, selections)),
                "assignment" => results.extend(self.search_assignments(query, selections)),
                "swap" => results.extend(self.search_swaps(query, selections)),
                _ => {}
            }
        }
        results
    }

    fn search_persons(&self, query: &str, selections: &[FacetSelection]) -> Vec<SearchResultItem> {
        self.count_query("person");
        let query_lower = query.to_lowercase();
        self.store
            .persons()
            .into_iter()
            .filter(|person| {
                query.is_empty()
                    || person.name.to_lowercase().contains(&query_lower)
                    || person.email.to_lowercase().contains(&query_lower)
                    || type_key(person.is_resident()).contains(&query_lower)
            })
            .filter(|person| {
                let type_value = type_key(person.is_resident());
                let pgy_value = person.pgy_level().map(|level| format!("PGY-{}", level));
                let role_value = person.faculty_role().map(|role| role.key().to_string());
                selection_allows(selections, "person_type", Some(type_value))
                    && selection_allows(selections, "pgy_level", pgy_value.as_deref())
                    && selection_allows(selections, "faculty_role", role_value.as_deref())
                    && hierarchical_allows(selections, "specialty", person.specialties())
            })
            .take(self.config.per_type_limit)
            .map(|person| {
                let type_value = type_key(person.is_resident());
                SearchResultItem {
                    id: person.id.to_string(),
                    entity_type: "person".to_string(),
                    title: person.name.clone(),
                    subtitle: title_case(type_value),
                    score: 1.0,
                    entity: json!({
                        "id": person.id,
                        "name": person.name,
                        "email": person.email,
                        "type": type_value,
                        "pgy_level": person.pgy_level(),
                        "faculty_role": person.faculty_role().map(|r| r.key()),
                        "specialties": person.specialties(),
                    }),
                }
            })
            .collect()
    }

    fn search_rotations(&self, query: &str, selections: &[FacetSelection]) -> Vec<SearchResultItem> {
        self.count_query("rotation");
        let query_lower = query.to_lowercase();
        self.store
            .rotation_templates()
            .into_iter()
            .filter(|rotation| !rotation.is_archived)
            .filter(|rotation| {
                query.is_empty()
                    || rotation.name.to_lowercase().contains(&query_lower)
                    || rotation.activity_type.to_lowercase().contains(&query_lower)
            })
            .filter(|rotation| {
                selection_allows(selections, "rotation_type", Some(&rotation.activity_type))
            })
            .take(self.config.per_type_limit)
            .map(|rotation| SearchResultItem {
                id: rotation.id.to_string(),
                entity_type: "rotation".to_string(),
                title: rotation.name.clone(),
                subtitle: title_case(&rotation.activity_type),
                score: 1.0,
                entity: json!({
                    "id": rotation.id,
                    "name": rotation.name,
                    "rotation_type": rotation.activity_type,
                }),
            })
            .collect()
    }

    fn search_procedures(&self, query: &str, selections: &[FacetSelection]) -> Vec<SearchResultItem> {
        self.count_query("procedure");
        let query_lower = query.to_lowercase();
        self.store
            .procedures()
            .into_iter()
            .filter(|procedure| {
                query.is_empty()
                    || procedure.name.to_lowercase().contains(&query_lower)
                    || procedure
                        .category
                        .as_deref()
                        .map_or(false, |c| c.to_lowercase().contains(&query_lower))
            })
            .filter(|procedure| {
                selection_allows(selections, "procedure_category", procedure.category.as_deref())
            })
            .take(self.config.per_type_limit)
            .map(|procedure| SearchResultItem {
                id: procedure.id.to_string(),
                entity_type: "procedure".to_string(),
                title: procedure.name.clone(),
                subtitle: procedure
                    .category
                    .clone()
                    .unwrap_or_else(|| "Procedure".to_string()),
                score: 1.0,
                entity: json!({
                    "id": procedure.id,
                    "name": procedure.name,
                    "category": procedure.category,
                }),
            })
            .collect()
    }

    fn search_assignments(&self, query: &str, selections: &[FacetSelection]) -> Vec<SearchResultItem> {
        self.count_query("assignment");
        let query_lower = query.to_lowercase();
        let date_selection = selections
            .iter()
            .find(|s| s.facet_name == "date_range" && s.date_start.is_some());

        self.store
            .assignments()
            .into_iter()
            .filter(|assignment| {
                query.is_empty()
                    || assignment.role.as_str().contains(&query_lower)
                    || assignment
                        .notes
                        .as_deref()
                        .map_or(false, |n| n.to_lowercase().contains(&query_lower))
            })
            .filter(|assignment| {
                selection_allows(selections, "assignment_role", Some(assignment.role.as_str()))
            })
            .filter_map(|assignment| {
                let date = self.store.block(assignment.block_id).map(|b| b.date);
                if let (Some(selection), Some(date)) = (date_selection, date) {
                    let start_ok = selection.date_start.map_or(true, |s| date >= s);
                    let end_ok = selection.date_end.map_or(true, |e| date <= e);
                    if !(start_ok && end_ok) {
                        return None;
                    }
                }
                Some((assignment, date))
            })
            .take(self.config.per_type_limit)
            .map(|(assignment, date)| SearchResultItem {
                id: assignment.id.to_string(),
                entity_type: "assignment".to_string(),
                title: format!("Assignment - {}", assignment.role.as_str()),
                subtitle: title_case(assignment.role.as_str()),
                score: 1.0,
                entity: json!({
                    "id": assignment.id,
                    "role": assignment.role.as_str(),
                    "date": date,
                }),
            })
            .collect()
    }

    fn search_swaps(&self, query: &str, selections: &[FacetSelection]) -> Vec<SearchResultItem> {
        self.count_query("swap");
        let query_lower = query.to_lowercase();
        self.store
            .swaps()
            .into_iter()
            .filter(|swap| {
                query.is_empty()
                    || swap.status.as_str().contains(&query_lower)
                    || swap.swap_type.to_lowercase().contains(&query_lower)
            })
            .filter(|swap| selection_allows(selections, "status", Some(swap.status.as_str())))
            .take(self.config.per_type_limit)
            .map(|swap| SearchResultItem {
                id: swap.id.to_string(),
                entity_type: "swap".to_string(),
                title: format!("Swap - {}", swap.status.as_str()),
                subtitle: title_case(&swap.swap_type),
                score: 1.0,
                entity: json!({
                    "id": swap.id,
                    "status": swap.status.as_str(),
                    "swap_type": swap.swap_type,
                }),
            })
            .collect()
    }

    fn generate_facets(
        &self,
        results: &[SearchResultItem],
        config: &FacetConfig,
        selections: &[FacetSelection],
    ) -> Vec<Facet> {
        let mut facets = Vec::new();

        if config.enabled_facets.iter().any(|f| f == "person_type") {
            if let Some(facet) = term_facet(
                results,
                config,
                selections,
                "person_type",
                "Person Type",
                FacetOrder::CountDesc,
                |item| entity_str(item, "type").map(|v| (title_case(&v), v)),
            ) {
                facets.push(facet);
            }
        }

        if config.enabled_facets.iter().any(|f| f == "pgy_level") {
            if let Some(facet) = term_facet(
                results,
                config,
                selections,
                "pgy_level",
                "PGY Level",
                FacetOrder::ValueAsc,
                |item| {
                    item.entity
                        .get("pgy_level")
                        .and_then(Value::as_u64)
                        .map(|level| {
                            let key = format!("PGY-{}", level);
                            (key.clone(), key)
                        })
                },
            ) {
                facets.push(facet);
            }
        }

        if config.enabled_facets.iter().any(|f| f == "faculty_role") {
            if let Some(facet) = term_facet(
                results,
                config,
                selections,
                "faculty_role",
                "Faculty Role",
                FacetOrder::CountDesc,
                |item| {
                    entity_str(item, "faculty_role").map(|key| (role_label(&key), key))
                },
            ) {
                facets.push(facet);
            }
        }

        if config.enabled_facets.iter().any(|f| f == "rotation_type") {
            if let Some(facet) = term_facet(
                results,
                config,
                selections,
                "rotation_type",
                "Rotation Type",
                FacetOrder::CountDesc,
                |item| entity_str(item, "rotation_type").map(|v| (title_case(&v), v)),
            ) {
                facets.push(facet);
            }
        }

        if config.enabled_facets.iter().any(|f| f == "status") {
            if let Some(facet) = term_facet(
                results,
                config,
                selections,
                "status",
                "Status",
                FacetOrder::CountDesc,
                |item| entity_str(item, "status").map(|v| (title_case(&v), v)),
            ) {
                facets.push(facet);
            }
        }

        if config.enable_date_facets && config.enabled_facets.iter().any(|f| f == "date_range") {
            facets.push(date_range_facet(results, selections));
        }

        if config.enable_hierarchical && config.enabled_facets.iter().any(|f| f == "specialty") {
            if let Some(facet) = specialty_facet(results, config) {
                facets.push(facet);
            }
        }

        if config.dynamic_ordering {
            facets.sort_by_key(|facet| std::cmp::Reverse(self.analytics.popularity(&facet.name)));
        }

        facets
    }
}

fn type_key(is_resident: bool) -> &'static str {
    if is_resident {
        "resident"
    } else {
        "faculty"
    }
}

fn entity_str(item: &SearchResultItem, key: &str) -> Option<String> {
    item.entity.get(key).and_then(Value::as_str).map(String::from)
}

fn title_case(text: &str) -> String {
    text.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn role_label(key: &str) -> String {
    for role in [
        FacultyRole::Pd,
        FacultyRole::Apd,
        FacultyRole::Oic,
        FacultyRole::DeptChief,
        FacultyRole::SportsMed,
        FacultyRole::Core,
    ] {
        if role.key() == key {
            return role.label().to_string();
        }
    }
    key.to_uppercase()
}

/// Whether a single-valued field passes the selections on a facet.
/// Within a facet, values combine by the selection's operator; a missing
/// field fails any non-empty selection.
fn selection_allows(selections: &[FacetSelection], facet_name: &str, value: Option<&str>) -> bool {
    for selection in selections.iter().filter(|s| s.facet_name == facet_name) {
        if selection.values.is_empty() {
            continue;
        }
        let Some(value) = value else {
            return false;
        };
        let passes = match selection.operator {
            SelectionOperator::Or => selection.values.iter().any(|v| v == value),
            SelectionOperator::And => selection.values.iter().all(|v| v == value),
        };
        if !passes {
            return false;
        }
    }
    true
}

/// Hierarchical selections match a tag exactly or any of its children
fn hierarchical_allows(selections: &[FacetSelection], facet_name: &str, tags: &[String]) -> bool {
    for selection in selections.iter().filter(|s| s.facet_name == facet_name) {
        if selection.values.is_empty() {
            continue;
        }
        let matches_one = |selected: &String| {
            tags.iter().any(|tag| {
                tag == selected || tag.starts_with(&format!("{} >", selected))
            })
        };
        let passes = match selection.operator {
            SelectionOperator::Or => selection.values.iter().any(matches_one),
            SelectionOperator::And => selection.values.iter().all(matches_one),
        };
        if !passes {
            return false;
        }
    }
    true
}

fn selected_values<'a>(selections: &'a [FacetSelection], facet_name: &str) -> Vec<&'a str> {
    selections
        .iter()
        .filter(|s| s.facet_name == facet_name)
        .flat_map(|s| s.values.iter().map(String::as_str))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn term_facet(
    results: &[SearchResultItem],
    config: &FacetConfig,
    selections: &[FacetSelection],
    name: &str,
    label: &str,
    order: FacetOrder,
    extract: impl Fn(&SearchResultItem) -> Option<(String, String)>,
) -> Option<Facet> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for item in results {
        if let Some((display, key)) = extract(item) {
            counts.entry(key).or_insert((display, 0)).1 += 1;
        }
    }
    if counts.is_empty() {
        return None;
    }

    let selected = selected_values(selections, name);
    let total_count = counts.values().map(|(_, count)| count).sum();

    let mut values: Vec<FacetValue> = counts
        .into_iter()
        .filter(|(_, (_, count))| *count >= config.min_facet_count)
        .map(|(key, (display, count))| {
            let mut value = FacetValue::new(display, key.clone(), count);
            value.selected = selected.contains(&key.as_str());
            value
        })
        .collect();

    match order {
        FacetOrder::ValueAsc => values.sort_by(|a, b| a.key.cmp(&b.key)),
        FacetOrder::ValueDesc => values.sort_by(|a, b| b.key.cmp(&a.key)),
        FacetOrder::CountAsc => values.sort_by(|a, b| a.count.cmp(&b.count).then(a.value.cmp(&b.value))),
        // Count descending, value ascending to break ties
        _ => values.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value))),
    }
    values.truncate(config.max_facet_values);

    Some(Facet {
        name: name.to_string(),
        label: label.to_string(),
        facet_type: FacetType::Term,
        values,
        date_range_values: Vec::new(),
        total_count,
        order,
        multi_select: true,
    })
}

fn date_range_facet(results: &[SearchResultItem], selections: &[FacetSelection]) -> Facet {
    let today = Utc::now().date_naive();
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let month_start = today.with_day(1).unwrap_or(today);

    let buckets = [
        ("Today", DateRangePeriod::Today, today, today),
        (
            "This Week",
            DateRangePeriod::ThisWeek,
            week_start,
            week_start + Duration::days(6),
        ),
        (
            "This Month",
            DateRangePeriod::ThisMonth,
            month_start,
            end_of_month(month_start),
        ),
        (
            "Last 7 Days",
            DateRangePeriod::Last7Days,
            today - Duration::days(7),
            today,
        ),
        (
            "Last 30 Days",
            DateRangePeriod::Last30Days,
            today - Duration::days(30),
            today,
        ),
        (
            "Last 90 Days",
            DateRangePeriod::Last90Days,
            today - Duration::days(90),
            today,
        ),
        (
            "Last Year",
            DateRangePeriod::LastYear,
            today - Duration::days(365),
            today,
        ),
    ];

    let dates: Vec<NaiveDate> = results
        .iter()
        .filter_map(|item| {
            item.entity
                .get("date")
                .and_then(Value::as_str)
                .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        })
        .collect();

    let active = selections
        .iter()
        .find(|s| s.facet_name == "date_range" && s.date_start.is_some());

    let mut date_range_values: Vec<DateRangeFacetValue> = buckets
        .iter()
        .map(|(label, period, start, end)| DateRangeFacetValue {
            label: label.to_string(),
            period: *period,
            start_date: Some(*start),
            end_date: Some(*end),
            count: dates.iter().filter(|d| **d >= *start && **d <= *end).count(),
            selected: active.map_or(false, |s| {
                s.date_start == Some(*start) && s.date_end == Some(*end)
            }),
        })
        .collect();

    // Custom range mirrors whatever the caller selected
    if let Some(selection) = active {
        if !date_range_values.iter().any(|v| v.selected) {
            date_range_values.push(DateRangeFacetValue {
                label: "Custom".to_string(),
                period: DateRangePeriod::Custom,
                start_date: selection.date_start,
                end_date: selection.date_end,
                count: dates
                    .iter()
                    .filter(|d| {
                        selection.date_start.map_or(true, |s| **d >= s)
                            && selection.date_end.map_or(true, |e| **d <= e)
                    })
                    .count(),
                selected: true,
            });
        }
    }

    Facet {
        name: "date_range".to_string(),
        label: "Date Range".to_string(),
        facet_type: FacetType::DateRange,
        values: Vec::new(),
        date_range_values,
        total_count: dates.len(),
        order: FacetOrder::Custom,
        // Date ranges are single-select
        multi_select: false,
    }
}

fn end_of_month(month_start: NaiveDate) -> NaiveDate {
    let next_month = if month_start.month() == 12 {
        NaiveDate::from_ymd_opt(month_start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(month_start.year(), month_start.month() + 1, 1)
    };
    next_month
        .map(|d| d - Duration::days(1))
        .unwrap_or(month_start)
}

/// `"Parent > Child"` specialty tags roll up into a two-level tree
fn specialty_facet(results: &[SearchResultItem], config: &FacetConfig) -> Option<Facet> {
    let mut hierarchy: HashMap<String, HashMap<String, usize>> = HashMap::new();

    for item in results {
        let Some(specialties) = item.entity.get("specialties").and_then(Value::as_array) else {
            continue;
        };
        for specialty in specialties.iter().filter_map(Value::as_str) {
            match specialty.split_once('>') {
                Some((parent, child)) => {
                    *hierarchy
                        .entry(parent.trim().to_string())
                        .or_default()
                        .entry(child.trim().to_string())
                        .or_insert(0) += 1;
                }
                None => {
                    hierarchy
                        .entry(specialty.trim().to_string())
                        .or_default();
                }
            }
        }
    }

    if hierarchy.is_empty() {
        return None;
    }

    let mut values: Vec<FacetValue> = hierarchy
        .into_iter()
        .map(|(parent, children)| {
            // Parents with no children still count themselves once
            let child_total: usize = children.values().sum();
            let mut parent_value =
                FacetValue::new(parent.clone(), parent.clone(), child_total.max(1));
            let mut child_values: Vec<FacetValue> = children
                .into_iter()
                .map(|(child, count)| {
                    let mut value =
                        FacetValue::new(child.clone(), format!("{} > {}", parent, child), count);
                    value.parent = Some(parent.clone());
                    value
                })
                .collect();
            child_values.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
            parent_value.children = child_values;
            parent_value
        })
        .collect();

    values.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
    values.truncate(config.max_facet_values);
    let total_count = values.iter().map(|v| v.count).sum();

    Some(Facet {
        name: "specialty".to_string(),
        label: "Specialty".to_string(),
        facet_type: FacetType::Hierarchical,
        values,
        date_range_values: Vec::new(),
        total_count,
        order: FacetOrder::CountDesc,
        multi_select: true,
    })
}
