//! Fuzzy name matching for import rows
//!
//! Candidate dictionaries are keyed on lowercased names. An exact match
//! scores 100; otherwise the best similarity at or above the threshold wins.

use crate::constants::FUZZY_MATCH_THRESHOLD;
use std::collections::HashMap;
use uuid::Uuid;

/// Name dictionary with similarity scoring
#[derive(Default)]
pub struct FuzzyMatcher {
    cache: HashMap<String, Uuid>,
}

impl FuzzyMatcher {
    /// Build from (name, id) pairs
    pub fn new(entries: impl IntoIterator<Item = (String, Uuid)>) -> Self {
        let cache = entries
            .into_iter()
            .map(|(name, id)| (name.trim().to_lowercase(), id))
            .collect();
        Self { cache }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Match a name, returning the best candidate and its 0-100 confidence.
    /// Below the threshold nothing matches and the score stays 0.
    pub fn match_name(&self, name: &str) -> (Option<Uuid>, u8) {
        let normalized = name.trim().to_lowercase();

        if let Some(id) = self.cache.get(&normalized) {
            return (Some(*id), 100);
        }

        let mut best: Option<Uuid> = None;
        let mut best_score: u8 = 0;
        for (candidate, id) in &self.cache {
            let score = similarity(&normalized, candidate);
            if score >= FUZZY_MATCH_THRESHOLD && score > best_score {
                best_score = score;
                best = Some(*id);
            }
        }
        (best, best_score)
    }
}

/// Sequence similarity as an integer 0-100
pub fn similarity(a: &str, b: &str) -> u8 {
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(names: &[&str]) -> (FuzzyMatcher, Vec<Uuid>) {
        let ids: Vec<Uuid> = names.iter().map(|_| Uuid::new_v4()).collect();
        let entries = names
            .iter()
            .zip(&ids)
            .map(|(name, id)| (name.to_string(), *id));
        (FuzzyMatcher::new(entries), ids)
    }

    #[test]
    fn test_exact_match_scores_100() {
        let (matcher, ids) = matcher(&["Dr. Sarah Smith"]);
        let (matched, score) = matcher.match_name("dr. sarah smith");
        assert_eq!(matched, Some(ids[0]));
        assert_eq!(score, 100);
    }

    #[test]
    fn test_close_match_above_threshold() {
        let (matcher, ids) = matcher(&["Dr. Sarah Smith"]);
        let (matched, score) = matcher.match_name("Dr. Sarah Smyth");
        assert_eq!(matched, Some(ids[0]));
        assert!(score >= FUZZY_MATCH_THRESHOLD);
        assert!(score < 100);
    }

    #[test]
    fn test_unrelated_name_does_not_match() {
        let (matcher, _) = matcher(&["Dr. Sarah Smith"]);
        let (matched, score) = matcher.match_name("Completely Different");
        assert_eq!(matched, None);
        assert_eq!(score, 0);
    }

    #[test]
    fn test_threshold_boundary() {
        // Exactly at the threshold matches; one point below does not
        assert!(FUZZY_MATCH_THRESHOLD == 70);
        // "abcdefghij" vs "abcdefghzz": 8/10 shared -> 80
        assert_eq!(similarity("abcdefghij", "abcdefgzzz"), 70);
        assert_eq!(similarity("abcdefghij", "abcdefzzzz"), 60);
    }

    #[test]
    fn test_best_of_multiple_candidates() {
        let (matcher, ids) = matcher(&["Jonathan Jones", "Jonathan Johns"]);
        let (matched, _) = matcher.match_name("Jonathan Johns");
        assert_eq!(matched, Some(ids[1]));
    }
}
