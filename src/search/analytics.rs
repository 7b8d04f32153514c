//! Facet usage analytics
//!
//! Tracks how often each facet is applied and how strongly it narrows
//! results; dynamic facet ordering reads the selection totals.

use crate::search::facet::FacetSelection;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Accumulated usage for one facet
#[derive(Debug, Clone, Serialize)]
pub struct FacetAnalytics {
    pub facet_name: String,
    pub total_selections: u64,
    /// Moving average of the % result reduction when applied
    pub avg_result_reduction: f64,
    pub last_updated: DateTime<Utc>,
}

impl FacetAnalytics {
    fn new(facet_name: &str) -> Self {
        Self {
            facet_name: facet_name.to_string(),
            total_selections: 0,
            avg_result_reduction: 0.0,
            last_updated: Utc::now(),
        }
    }
}

/// Process-wide accumulator, updated after every search
#[derive(Default)]
pub struct FacetAnalyticsTracker {
    entries: Mutex<HashMap<String, FacetAnalytics>>,
}

impl FacetAnalyticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one search's applied selections
    pub fn record_usage(
        &self,
        selections: &[FacetSelection],
        total_before: usize,
        total_after: usize,
    ) {
        let mut entries = self.entries.lock();
        for selection in selections {
            let analytics = entries
                .entry(selection.facet_name.clone())
                .or_insert_with(|| FacetAnalytics::new(&selection.facet_name));
            analytics.total_selections += 1;
            if total_before > 0 {
                let reduction =
                    (total_before.saturating_sub(total_after)) as f64 / total_before as f64 * 100.0;
                analytics.avg_result_reduction =
                    (analytics.avg_result_reduction + reduction) / 2.0;
            }
            analytics.last_updated = Utc::now();
        }
    }

    /// Selection total for dynamic ordering; 0 for unseen facets
    pub fn popularity(&self, facet_name: &str) -> u64 {
        self.entries
            .lock()
            .get(facet_name)
            .map_or(0, |a| a.total_selections)
    }

    /// Snapshot for one facet or all
    pub fn snapshot(&self, facet_name: Option<&str>) -> Vec<FacetAnalytics> {
        let entries = self.entries.lock();
        match facet_name {
            Some(name) => entries.get(name).cloned().into_iter().collect(),
            None => entries.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_counting() {
        let tracker = FacetAnalyticsTracker::new();
        let selections = vec![FacetSelection::terms("person_type", vec!["resident".into()])];
        tracker.record_usage(&selections, 100, 40);
        tracker.record_usage(&selections, 100, 40);
        assert_eq!(tracker.popularity("person_type"), 2);
        assert_eq!(tracker.popularity("never_used"), 0);

        let snapshot = tracker.snapshot(Some("person_type"));
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].avg_result_reduction > 0.0);
    }
}
