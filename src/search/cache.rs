//! TTL'd LRU cache for faceted search responses

use crate::search::facet::{FacetSelection, FacetedSearchResponse};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Deterministic cache key for a search: entity types sorted, each
/// selection's values sorted, selections ordered by facet name
pub fn cache_key(query: &str, entity_types: &[String], selections: &[FacetSelection]) -> String {
    let mut types = entity_types.to_vec();
    types.sort();

    let mut ordered: Vec<&FacetSelection> = selections.iter().collect();
    ordered.sort_by(|a, b| a.facet_name.cmp(&b.facet_name));

    let mut canonical = format!("q={}|types={}", query, types.join(","));
    for selection in ordered {
        let mut values = selection.values.clone();
        values.sort();
        canonical.push_str(&format!(
            "|{}:{}:{:?}:{:?}:{:?}",
            selection.facet_name,
            values.join(","),
            selection.operator,
            selection.date_start,
            selection.date_end,
        ));
    }

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

/// Bounded response cache with per-entry TTL
pub struct SearchCache {
    entries: Mutex<LruCache<String, (FacetedSearchResponse, Instant)>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<FacetedSearchResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((response, stored_at)) if stored_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(response.clone())
            }
            Some(_) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, response: FacetedSearchResponse) {
        self.entries.lock().put(key, (response, Instant::now()));
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_response() -> FacetedSearchResponse {
        FacetedSearchResponse {
            items: Vec::new(),
            total: 0,
            page: 1,
            page_size: 20,
            total_pages: 0,
            facets: Vec::new(),
            applied_facets: Vec::new(),
            query: String::new(),
            execution_time_ms: 0.0,
        }
    }

    #[test]
    fn test_key_is_order_insensitive() {
        let types_a = vec!["person".to_string(), "rotation".to_string()];
        let types_b = vec!["rotation".to_string(), "person".to_string()];
        let sel_a = vec![
            FacetSelection::terms("status", vec!["a".into(), "b".into()]),
            FacetSelection::terms("pgy_level", vec!["PGY-1".into()]),
        ];
        let sel_b = vec![
            FacetSelection::terms("pgy_level", vec!["PGY-1".into()]),
            FacetSelection::terms("status", vec!["b".into(), "a".into()]),
        ];
        assert_eq!(cache_key("q", &types_a, &sel_a), cache_key("q", &types_b, &sel_b));
        assert_ne!(cache_key("q", &types_a, &sel_a), cache_key("other", &types_a, &sel_a));
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = SearchCache::new(8, Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.put("k".to_string(), empty_response());
        assert!(cache.get("k").is_some());
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = SearchCache::new(8, Duration::from_millis(1));
        cache.put("k".to_string(), empty_response());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }
}
