//! End-to-end contingency analysis scenarios

use chrono::{Duration, NaiveDate};
use medshift::domain::{Assignment, AssignmentRole, Block, Person, TimeOfDay};
use medshift::resilience::{ContingencyAnalyzer, ContingencyOptions};
use medshift::store::{Datastore, MemoryStore};
use std::sync::Arc;

/// Faculty F alone on 10 of 20 blocks: N-1 on F leaves 10 uncovered, making
/// F a critical unique provider and failing N-1 overall.
#[test]
fn sole_provider_fails_n1() {
    let store = Arc::new(MemoryStore::new());
    let start = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();

    let solo = Person::faculty("Dr. Solo", "solo@example.com");
    store.insert_person(solo.clone()).unwrap();

    // 20 blocks over 10 days; Dr. Solo is the only name on the AM blocks
    for offset in 0..10 {
        let date = start + Duration::days(offset);
        let am = Block::new(date, TimeOfDay::Am);
        let pm = Block::new(date, TimeOfDay::Pm);
        store.insert_block(am.clone()).unwrap();
        store.insert_block(pm.clone()).unwrap();
        store
            .insert_assignment(Assignment::new(am.id, solo.id, AssignmentRole::Supervising))
            .unwrap();
    }

    let analyzer = ContingencyAnalyzer::new(store);
    let report = analyzer.analyze(start, end, ContingencyOptions::standard());

    assert!(!report.n1_pass);
    let simulation = report
        .n1_simulations
        .iter()
        .find(|s| s.faculty_id == solo.id)
        .unwrap();
    assert_eq!(simulation.blocks_affected, 10);
    assert_eq!(simulation.uncovered_blocks.len(), 10);
    assert!(simulation.is_critical);
    assert!((simulation.coverage_remaining - 0.5).abs() < 1e-9);

    let vulnerability = &report.n1_vulnerabilities[0];
    assert_eq!(vulnerability.severity, "critical");
    assert!(vulnerability.is_unique_provider);
    assert!(report
        .recommended_actions
        .iter()
        .any(|a| a.contains("Cross-train")));
    assert!(report.version_id.is_some());
}

/// With zero faculty the analysis passes trivially.
#[test]
fn zero_faculty_passes_everything() {
    let store = Arc::new(MemoryStore::new());
    let analyzer = ContingencyAnalyzer::new(store);
    let report = analyzer.analyze(
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
        ContingencyOptions::standard(),
    );
    assert!(report.n1_pass);
    assert!(report.n2_pass);
    assert_eq!(report.phase_transition_risk, "low");
    assert!(report.recommended_actions.is_empty());
    assert!(report.centrality_scores.is_empty());
}

/// Redundant coverage survives N-1; losing both members of the only pair
/// shows up as a fatal pair in N-2.
#[test]
fn redundant_pair_is_fatal_only_in_n2() {
    let store = Arc::new(MemoryStore::new());
    let start = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

    let first = Person::faculty("Dr. A", "a@example.com");
    let second = Person::faculty("Dr. B", "b@example.com");
    store.insert_person(first.clone()).unwrap();
    store.insert_person(second.clone()).unwrap();

    let block = Block::new(start, TimeOfDay::Am);
    store.insert_block(block.clone()).unwrap();
    store
        .insert_assignment(Assignment::new(block.id, first.id, AssignmentRole::Supervising))
        .unwrap();
    store
        .insert_assignment(Assignment::new(block.id, second.id, AssignmentRole::Backup))
        .unwrap();

    let analyzer = ContingencyAnalyzer::new(store);
    let report = analyzer.analyze(start, start, ContingencyOptions::standard());

    assert!(report.n1_pass);
    assert!(!report.n2_pass);
    assert_eq!(report.n2_fatal_pairs.len(), 1);
    assert_eq!(report.n2_fatal_pairs[0].uncoverable_blocks, 1);
}

/// The quick assessment mirrors the full analysis minus N-2.
#[test]
fn vulnerability_assessment_summarizes() {
    let store = Arc::new(MemoryStore::new());
    let start = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

    let solo = Person::faculty("Dr. Solo", "solo@example.com");
    store.insert_person(solo.clone()).unwrap();
    let block = Block::new(start, TimeOfDay::Am);
    store.insert_block(block.clone()).unwrap();
    store
        .insert_assignment(Assignment::new(block.id, solo.id, AssignmentRole::Supervising))
        .unwrap();

    let analyzer = ContingencyAnalyzer::new(store);
    let assessment = analyzer.vulnerability_assessment(start, start);
    assert!(!assessment.n1_pass);
    assert_eq!(assessment.critical_vulnerabilities, 1);
    assert_eq!(assessment.fatal_pairs_count, 0);
    assert_eq!(assessment.total_blocks, 1);
    assert_eq!(assessment.total_assignments, 1);
}

/// Centrality ranks the heavily loaded faculty above the light one.
#[test]
fn centrality_ranks_by_load() {
    let store = Arc::new(MemoryStore::new());
    let start = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

    let busy = Person::faculty("Dr. Busy", "busy@example.com");
    let light = Person::faculty("Dr. Light", "light@example.com");
    store.insert_person(busy.clone()).unwrap();
    store.insert_person(light.clone()).unwrap();

    for offset in 0..5 {
        let block = Block::new(start + Duration::days(offset), TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();
        store
            .insert_assignment(Assignment::new(block.id, busy.id, AssignmentRole::Supervising))
            .unwrap();
        if offset == 0 {
            let pm = Block::new(start, TimeOfDay::Pm);
            store.insert_block(pm.clone()).unwrap();
            store
                .insert_assignment(Assignment::new(pm.id, light.id, AssignmentRole::Supervising))
                .unwrap();
        }
    }

    let analyzer = ContingencyAnalyzer::new(store);
    let scores = analyzer.calculate_centrality(
        start,
        start + Duration::days(5),
        &std::collections::HashMap::new(),
    );
    assert_eq!(scores[0].faculty_id, busy.id);
    assert!(scores[0].centrality_score > scores[1].centrality_score);
    assert!(scores[0].workload_share > scores[1].workload_share);
}
