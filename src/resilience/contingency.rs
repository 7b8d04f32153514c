//! N-1 / N-2 contingency analysis
//!
//! Power-grid resilience principles applied to faculty coverage: the system
//! should survive the loss of any one provider (N-1) and, for critical
//! periods, any two (N-2). Simulation runs off three lookup tables built in a
//! single pass over assignments, so each faculty costs O(affected blocks).

use crate::domain::{Assignment, Block, Person};
use crate::resilience::centrality::{faculty_centrality, GraphMetrics};
use crate::store::Datastore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// A single N-1 vulnerability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
    pub faculty_id: Uuid,
    pub faculty_name: String,
    /// "critical", "high", "medium" or "low"
    pub severity: String,
    pub affected_blocks: usize,
    pub is_unique_provider: bool,
    pub details: String,
}

/// A faculty pair whose simultaneous loss leaves blocks uncovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatalPairInfo {
    pub faculty1_id: Uuid,
    pub faculty1_name: String,
    pub faculty2_id: Uuid,
    pub faculty2_name: String,
    pub uncoverable_blocks: usize,
}

/// Centrality ranking entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralityInfo {
    pub faculty_id: Uuid,
    pub faculty_name: String,
    pub centrality_score: f64,
    pub services_covered: usize,
    pub unique_coverage_slots: usize,
    pub replacement_difficulty: f64,
    pub workload_share: f64,
    pub betweenness: f64,
    pub degree: f64,
    pub eigenvector: f64,
    pub pagerank: f64,
}

/// Result of simulating a single faculty loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct N1SimulationResult {
    pub faculty_id: Uuid,
    pub faculty_name: String,
    pub blocks_affected: usize,
    pub coverage_remaining: f64,
    pub is_critical: bool,
    pub uncovered_blocks: Vec<Uuid>,
    pub simulation_time_ms: f64,
}

/// Result of simulating a faculty pair loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct N2SimulationResult {
    pub faculty1_id: Uuid,
    pub faculty2_id: Uuid,
    pub blocks_affected: usize,
    pub coverage_remaining: f64,
    pub is_fatal: bool,
    pub uncovered_blocks: Vec<Uuid>,
}

/// Quick summary without the full simulation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityAssessment {
    pub assessed_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_faculty: usize,
    pub total_blocks: usize,
    pub total_assignments: usize,
    pub n1_pass: bool,
    pub n2_pass: bool,
    pub phase_transition_risk: String,
    pub vulnerabilities_count: usize,
    pub critical_vulnerabilities: usize,
    pub fatal_pairs_count: usize,
}

/// Complete contingency analysis output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyReport {
    pub analysis_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub n1_pass: bool,
    pub n1_vulnerabilities: Vec<VulnerabilityInfo>,
    pub n1_simulations: Vec<N1SimulationResult>,
    pub n2_pass: bool,
    pub n2_fatal_pairs: Vec<FatalPairInfo>,
    pub centrality_scores: Vec<CentralityInfo>,
    pub most_critical_faculty: Vec<Uuid>,
    /// "low", "medium", "high" or "critical"
    pub phase_transition_risk: String,
    pub leading_indicators: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub analysis_duration_ms: f64,
    /// Store transaction id at analysis time, for staleness detection
    pub version_id: Option<u64>,
}

/// Analysis tuning
#[derive(Debug, Clone, Default)]
pub struct ContingencyOptions {
    /// Required providers per block; defaults to 1 everywhere
    pub coverage_requirements: HashMap<Uuid, usize>,
    /// Current utilization feeding the phase-transition indicators
    pub current_utilization: f64,
    pub include_n2: bool,
    pub max_n2_pairs: usize,
    /// Service capability mapping (service id -> faculty able to staff it)
    pub services: HashMap<Uuid, Vec<Uuid>>,
}

impl ContingencyOptions {
    pub fn standard() -> Self {
        Self {
            include_n2: true,
            max_n2_pairs: 100,
            ..Self::default()
        }
    }
}

struct LookupTables {
    assignments_by_faculty: HashMap<Uuid, Vec<Assignment>>,
    assignments_by_block: HashMap<Uuid, Vec<Assignment>>,
    faculty_assignment_count: HashMap<Uuid, usize>,
}

/// N-1 / N-2 contingency analyzer over the persistence port
pub struct ContingencyAnalyzer {
    store: Arc<dyn Datastore>,
}

impl ContingencyAnalyzer {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Run the full N-1/N-2 analysis for the period
    pub fn analyze(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        options: ContingencyOptions,
    ) -> ContingencyReport {
        let started = Instant::now();
        let analysis_id = Uuid::new_v4();

        let (faculty, blocks, assignments) = self.load_data(start_date, end_date);

        if faculty.is_empty() || blocks.is_empty() {
            return self.empty_report(analysis_id, start_date, end_date);
        }

        let coverage_requirements = options.coverage_requirements.clone();
        let lookups = build_lookup_tables(&assignments);

        let (n1_simulations, n1_vulnerabilities) =
            self.run_n1(&faculty, &blocks, &coverage_requirements, &lookups);
        let n1_pass = !n1_vulnerabilities.iter().any(|v| v.severity == "critical");

        let n2_fatal_pairs = if options.include_n2 {
            self.run_n2(
                &faculty,
                &blocks,
                &coverage_requirements,
                &lookups,
                &n1_vulnerabilities,
                options.max_n2_pairs,
            )
        } else {
            Vec::new()
        };
        let n2_pass = n2_fatal_pairs.is_empty();

        let centrality_scores =
            self.centrality(&faculty, &assignments, &options.services, &lookups);

        let most_critical_faculty: Vec<Uuid> = n1_vulnerabilities
            .iter()
            .filter(|v| v.severity == "critical" || v.severity == "high")
            .map(|v| v.faculty_id)
            .take(5)
            .collect();

        let (phase_transition_risk, leading_indicators) = detect_phase_transition(
            options.current_utilization,
            &n1_vulnerabilities,
            &n2_fatal_pairs,
        );

        let recommended_actions = build_recommendations(
            n1_pass,
            n2_pass,
            &n1_vulnerabilities,
            &phase_transition_risk,
        );

        let analysis_duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            n1_pass,
            n2_pass,
            vulnerabilities = n1_vulnerabilities.len(),
            fatal_pairs = n2_fatal_pairs.len(),
            duration_ms = analysis_duration_ms,
            "contingency analysis completed"
        );

        ContingencyReport {
            analysis_id,
            analyzed_at: Utc::now(),
            period_start: start_date,
            period_end: end_date,
            n1_pass,
            n1_vulnerabilities,
            n1_simulations,
            n2_pass,
            n2_fatal_pairs,
            centrality_scores,
            most_critical_faculty,
            phase_transition_risk,
            leading_indicators,
            recommended_actions,
            analysis_duration_ms,
            version_id: Some(self.store.transaction_id()),
        }
    }

    /// Quick health-check summary; skips the expensive N-2 pass
    pub fn vulnerability_assessment(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> VulnerabilityAssessment {
        let options = ContingencyOptions {
            include_n2: false,
            ..ContingencyOptions::standard()
        };
        let report = self.analyze(start_date, end_date, options);
        let critical = report
            .n1_vulnerabilities
            .iter()
            .filter(|v| v.severity == "critical")
            .count();
        let (_, blocks, assignments) = self.load_data(start_date, end_date);

        VulnerabilityAssessment {
            assessed_at: report.analyzed_at,
            period_start: start_date,
            period_end: end_date,
            total_faculty: report.n1_simulations.len(),
            total_blocks: blocks.len(),
            total_assignments: assignments.len(),
            n1_pass: report.n1_pass,
            n2_pass: report.n2_pass,
            phase_transition_risk: report.phase_transition_risk,
            vulnerabilities_count: report.n1_vulnerabilities.len(),
            critical_vulnerabilities: critical,
            fatal_pairs_count: report.n2_fatal_pairs.len(),
        }
    }

    /// What-if simulation for one faculty member
    pub fn simulate_faculty_loss(
        &self,
        faculty_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> N1SimulationResult {
        let started = Instant::now();
        let (faculty, blocks, assignments) = self.load_data(start_date, end_date);

        let Some(target) = faculty.iter().find(|f| f.id == faculty_id) else {
            return N1SimulationResult {
                faculty_id,
                faculty_name: "Unknown".to_string(),
                blocks_affected: 0,
                coverage_remaining: 1.0,
                is_critical: false,
                uncovered_blocks: Vec::new(),
                simulation_time_ms: 0.0,
            };
        };

        let lookups = build_lookup_tables(&assignments);
        let mut result = simulate_single_loss(target, &blocks, &HashMap::new(), &lookups);
        result.simulation_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    }

    /// Centrality ranking as a standalone operation
    pub fn calculate_centrality(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        services: &HashMap<Uuid, Vec<Uuid>>,
    ) -> Vec<CentralityInfo> {
        let (faculty, _, assignments) = self.load_data(start_date, end_date);
        if faculty.is_empty() {
            return Vec::new();
        }
        let lookups = build_lookup_tables(&assignments);
        self.centrality(&faculty, &assignments, services, &lookups)
    }

    fn load_data(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> (Vec<Person>, Vec<Block>, Vec<Assignment>) {
        let faculty: Vec<Person> = self
            .store
            .persons()
            .into_iter()
            .filter(|p| p.is_faculty())
            .collect();
        let blocks = self.store.blocks_in_range(start_date, end_date);
        let assignments = self.store.assignments_in_range(start_date, end_date);
        debug!(
            faculty = faculty.len(),
            blocks = blocks.len(),
            assignments = assignments.len(),
            "loaded contingency data"
        );
        (faculty, blocks, assignments)
    }

    fn run_n1(
        &self,
        faculty: &[Person],
        blocks: &[Block],
        coverage_requirements: &HashMap<Uuid, usize>,
        lookups: &LookupTables,
    ) -> (Vec<N1SimulationResult>, Vec<VulnerabilityInfo>) {
        let mut simulations = Vec::new();
        let mut vulnerabilities = Vec::new();

        for member in faculty {
            let member_assignments = lookups.assignments_by_faculty.get(&member.id);

            // Faculty with no assignments short-circuit
            let Some(member_assignments) = member_assignments.filter(|a| !a.is_empty()) else {
                simulations.push(N1SimulationResult {
                    faculty_id: member.id,
                    faculty_name: member.name.clone(),
                    blocks_affected: 0,
                    coverage_remaining: 1.0,
                    is_critical: false,
                    uncovered_blocks: Vec::new(),
                    simulation_time_ms: 0.0,
                });
                continue;
            };

            let result = simulate_single_loss(member, blocks, coverage_requirements, lookups);

            if result.blocks_affected > 0 {
                let is_unique = member_assignments.iter().any(|a| {
                    lookups
                        .assignments_by_block
                        .get(&a.block_id)
                        .map_or(false, |peers| peers.len() == 1)
                });
                let severity = severity_for(result.blocks_affected, is_unique, blocks.len());
                vulnerabilities.push(VulnerabilityInfo {
                    faculty_id: member.id,
                    faculty_name: member.name.clone(),
                    severity: severity.to_string(),
                    affected_blocks: result.blocks_affected,
                    is_unique_provider: is_unique,
                    details: format!(
                        "Loss would leave {} blocks under-covered",
                        result.blocks_affected
                    ),
                });
            }

            simulations.push(result);
        }

        vulnerabilities.sort_by_key(|v| {
            let order = match v.severity.as_str() {
                "critical" => 0,
                "high" => 1,
                "medium" => 2,
                "low" => 3,
                _ => 4,
            };
            (order, usize::MAX - v.affected_blocks)
        });

        (simulations, vulnerabilities)
    }

    fn run_n2(
        &self,
        faculty: &[Person],
        blocks: &[Block],
        coverage_requirements: &HashMap<Uuid, usize>,
        lookups: &LookupTables,
        n1_vulnerabilities: &[VulnerabilityInfo],
        max_pairs: usize,
    ) -> Vec<FatalPairInfo> {
        let critical_ids: HashSet<Uuid> = n1_vulnerabilities
            .iter()
            .filter(|v| v.severity == "critical" || v.severity == "high")
            .map(|v| v.faculty_id)
            .collect();

        // Fall back to the most-loaded faculty when N-1 found fewer than two
        let analysis_faculty: Vec<&Person> = if critical_ids.len() < 2 {
            let mut sorted: Vec<&Person> = faculty.iter().collect();
            sorted.sort_by_key(|f| {
                usize::MAX - lookups.faculty_assignment_count.get(&f.id).copied().unwrap_or(0)
            });
            sorted.into_iter().take(10).collect()
        } else {
            faculty.iter().filter(|f| critical_ids.contains(&f.id)).collect()
        };

        let mut fatal_pairs = Vec::new();
        let mut pairs_analyzed = 0usize;

        'outer: for (i, first) in analysis_faculty.iter().enumerate() {
            for second in analysis_faculty.iter().skip(i + 1) {
                if pairs_analyzed >= max_pairs {
                    break 'outer;
                }
                let result =
                    simulate_pair_loss(first, second, blocks, coverage_requirements, lookups);
                if result.is_fatal {
                    fatal_pairs.push(FatalPairInfo {
                        faculty1_id: first.id,
                        faculty1_name: first.name.clone(),
                        faculty2_id: second.id,
                        faculty2_name: second.name.clone(),
                        uncoverable_blocks: result.blocks_affected,
                    });
                }
                pairs_analyzed += 1;
            }
        }

        fatal_pairs.sort_by_key(|p| usize::MAX - p.uncoverable_blocks);
        fatal_pairs
    }

    fn centrality(
        &self,
        faculty: &[Person],
        assignments: &[Assignment],
        services: &HashMap<Uuid, Vec<Uuid>>,
        lookups: &LookupTables,
    ) -> Vec<CentralityInfo> {
        let total_assignments = assignments.len();
        let faculty_ids: Vec<Uuid> = faculty.iter().map(|f| f.id).collect();
        let coverage_edges: Vec<(Uuid, Uuid)> = assignments
            .iter()
            .map(|a| (a.person_id, a.block_id))
            .collect();
        let graph_metrics = faculty_centrality(&faculty_ids, &coverage_edges, services);

        let mut scores: Vec<CentralityInfo> = faculty
            .iter()
            .map(|member| {
                let services_covered = services
                    .values()
                    .filter(|staff| staff.contains(&member.id))
                    .count();
                let unique_coverage = services
                    .values()
                    .filter(|staff| staff.as_slice() == [member.id])
                    .count();

                let replacement_difficulty = if services_covered > 0 {
                    let avg_alternatives: f64 = services
                        .values()
                        .filter(|staff| staff.contains(&member.id))
                        .map(|staff| (staff.len() - 1) as f64)
                        .sum::<f64>()
                        / services_covered as f64;
                    1.0 / (1.0 + avg_alternatives)
                } else {
                    0.0
                };

                let workload_share = if total_assignments > 0 {
                    lookups
                        .faculty_assignment_count
                        .get(&member.id)
                        .copied()
                        .unwrap_or(0) as f64
                        / total_assignments as f64
                } else {
                    0.0
                };

                let metrics = graph_metrics.get(&member.id).copied();
                let score = match metrics {
                    Some(GraphMetrics {
                        betweenness,
                        degree,
                        eigenvector,
                        pagerank,
                    }) => {
                        0.25 * betweenness
                            + 0.25 * pagerank
                            + 0.15 * degree
                            + 0.10 * eigenvector
                            + 0.15 * replacement_difficulty
                            + 0.10 * workload_share
                    }
                    None => {
                        let service_denom = services.len().max(1) as f64;
                        0.30 * (services_covered as f64 / service_denom)
                            + 0.30 * (unique_coverage as f64 / service_denom)
                            + 0.20 * replacement_difficulty
                            + 0.20 * workload_share
                    }
                };
                let metrics = metrics.unwrap_or_default();

                CentralityInfo {
                    faculty_id: member.id,
                    faculty_name: member.name.clone(),
                    centrality_score: score,
                    services_covered,
                    unique_coverage_slots: unique_coverage,
                    replacement_difficulty,
                    workload_share,
                    betweenness: metrics.betweenness,
                    degree: metrics.degree,
                    eigenvector: metrics.eigenvector,
                    pagerank: metrics.pagerank,
                }
            })
            .collect();

        scores.sort_by(|a, b| {
            b.centrality_score
                .partial_cmp(&a.centrality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scores
    }

    fn empty_report(
        &self,
        analysis_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ContingencyReport {
        ContingencyReport {
            analysis_id,
            analyzed_at: Utc::now(),
            period_start: start_date,
            period_end: end_date,
            n1_pass: true,
            n1_vulnerabilities: Vec::new(),
            n1_simulations: Vec::new(),
            n2_pass: true,
            n2_fatal_pairs: Vec::new(),
            centrality_scores: Vec::new(),
            most_critical_faculty: Vec::new(),
            phase_transition_risk: "low".to_string(),
            leading_indicators: Vec::new(),
            recommended_actions: Vec::new(),
            analysis_duration_ms: 0.0,
            version_id: Some(self.store.transaction_id()),
        }
    }
}

fn build_lookup_tables(assignments: &[Assignment]) -> LookupTables {
    let mut assignments_by_faculty: HashMap<Uuid, Vec<Assignment>> = HashMap::new();
    let mut assignments_by_block: HashMap<Uuid, Vec<Assignment>> = HashMap::new();
    let mut faculty_assignment_count: HashMap<Uuid, usize> = HashMap::new();

    for assignment in assignments {
        assignments_by_faculty
            .entry(assignment.person_id)
            .or_default()
            .push(assignment.clone());
        assignments_by_block
            .entry(assignment.block_id)
            .or_default()
            .push(assignment.clone());
        *faculty_assignment_count.entry(assignment.person_id).or_insert(0) += 1;
    }

    LookupTables {
        assignments_by_faculty,
        assignments_by_block,
        faculty_assignment_count,
    }
}

fn simulate_single_loss(
    member: &Person,
    blocks: &[Block],
    coverage_requirements: &HashMap<Uuid, usize>,
    lookups: &LookupTables,
) -> N1SimulationResult {
    let member_assignments = lookups
        .assignments_by_faculty
        .get(&member.id)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut affected_blocks = Vec::new();
    let mut uncovered_blocks = Vec::new();

    for assignment in member_assignments {
        let block_assignments = lookups
            .assignments_by_block
            .get(&assignment.block_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let remaining = block_assignments
            .iter()
            .filter(|a| a.person_id != member.id)
            .count();
        let required = coverage_requirements.get(&assignment.block_id).copied().unwrap_or(1);
        if remaining < required {
            affected_blocks.push(assignment.block_id);
            if remaining == 0 {
                uncovered_blocks.push(assignment.block_id);
            }
        }
    }

    let total_blocks = blocks.len();
    let coverage_remaining = if total_blocks > 0 {
        1.0 - affected_blocks.len() as f64 / total_blocks as f64
    } else {
        1.0
    };

    N1SimulationResult {
        faculty_id: member.id,
        faculty_name: member.name.clone(),
        blocks_affected: affected_blocks.len(),
        coverage_remaining,
        is_critical: !uncovered_blocks.is_empty(),
        uncovered_blocks,
        simulation_time_ms: 0.0,
    }
}

fn simulate_pair_loss(
    first: &Person,
    second: &Person,
    blocks: &[Block],
    coverage_requirements: &HashMap<Uuid, usize>,
    lookups: &LookupTables,
) -> N2SimulationResult {
    let first_blocks: HashSet<Uuid> = lookups
        .assignments_by_faculty
        .get(&first.id)
        .map(|a| a.iter().map(|x| x.block_id).collect())
        .unwrap_or_default();
    let second_blocks: HashSet<Uuid> = lookups
        .assignments_by_faculty
        .get(&second.id)
        .map(|a| a.iter().map(|x| x.block_id).collect())
        .unwrap_or_default();

    let mut uncovered = Vec::new();
    for block_id in first_blocks.union(&second_blocks) {
        let block_assignments = lookups
            .assignments_by_block
            .get(block_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let remaining = block_assignments
            .iter()
            .filter(|a| a.person_id != first.id && a.person_id != second.id)
            .count();
        let required = coverage_requirements.get(block_id).copied().unwrap_or(1);
        if remaining < required {
            uncovered.push(*block_id);
        }
    }

    let total_blocks = blocks.len();
    let coverage_remaining = if total_blocks > 0 {
        1.0 - uncovered.len() as f64 / total_blocks as f64
    } else {
        1.0
    };

    N2SimulationResult {
        faculty1_id: first.id,
        faculty2_id: second.id,
        blocks_affected: uncovered.len(),
        coverage_remaining,
        is_fatal: !uncovered.is_empty(),
        uncovered_blocks: uncovered,
    }
}

/// Severity ladder for an N-1 vulnerability
fn severity_for(affected_blocks: usize, is_unique: bool, total_blocks: usize) -> &'static str {
    if is_unique {
        return "critical";
    }
    if total_blocks == 0 {
        return "low";
    }
    let ratio = affected_blocks as f64 / total_blocks as f64;
    if ratio > 0.20 {
        "critical"
    } else if ratio > 0.10 || affected_blocks > 10 {
        "high"
    } else if ratio > 0.05 || affected_blocks > 5 {
        "medium"
    } else {
        "low"
    }
}

fn detect_phase_transition(
    current_utilization: f64,
    vulnerabilities: &[VulnerabilityInfo],
    fatal_pairs: &[FatalPairInfo],
) -> (String, Vec<String>) {
    let mut indicators = Vec::new();

    if current_utilization > 0.95 {
        indicators.push("Utilization above 95% - in critical zone".to_string());
    } else if current_utilization > 0.90 {
        indicators.push("Utilization above 90% - approaching critical".to_string());
    } else if current_utilization > 0.85 {
        indicators.push("Utilization above 85% - elevated risk".to_string());
    }

    let critical_count = vulnerabilities
        .iter()
        .filter(|v| v.severity == "critical")
        .count();
    if critical_count >= 3 {
        indicators.push(format!(
            "{} critical vulnerabilities - high cascade risk",
            critical_count
        ));
    } else if critical_count >= 1 {
        indicators.push(format!("{} critical vulnerabilities detected", critical_count));
    }

    if fatal_pairs.len() >= 5 {
        indicators.push(format!("{} fatal pairs - fragile system", fatal_pairs.len()));
    } else if !fatal_pairs.is_empty() {
        indicators.push(format!("{} fatal pairs detected", fatal_pairs.len()));
    }

    let risk = match indicators.len() {
        n if n >= 3 => "critical",
        2 => "high",
        1 => "medium",
        _ => "low",
    };

    (risk.to_string(), indicators)
}

fn build_recommendations(
    n1_pass: bool,
    n2_pass: bool,
    vulnerabilities: &[VulnerabilityInfo],
    phase_risk: &str,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if !n1_pass {
        recommendations.push("URGENT: Cross-train backup for critical faculty".to_string());
    }
    if !n2_pass {
        recommendations.push(
            "Schedule high-centrality faculty on different days when possible".to_string(),
        );
    }
    if phase_risk == "high" || phase_risk == "critical" {
        recommendations
            .push("System approaching phase transition - reduce load immediately".to_string());
    }
    for vulnerability in vulnerabilities.iter().take(3) {
        if vulnerability.is_unique_provider {
            recommendations.push(format!(
                "Train backup for {} - sole provider for some services",
                vulnerability.faculty_name
            ));
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssignmentRole, TimeOfDay};
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, NaiveDate, NaiveDate) {
        let store = Arc::new(MemoryStore::new());
        let start = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 4, 30).unwrap();
        (store, start, end)
    }

    #[test]
    fn test_zero_faculty_passes() {
        let (store, start, end) = setup();
        let analyzer = ContingencyAnalyzer::new(store);
        let report = analyzer.analyze(start, end, ContingencyOptions::standard());
        assert!(report.n1_pass);
        assert!(report.n2_pass);
        assert_eq!(report.phase_transition_risk, "low");
        assert!(report.recommended_actions.is_empty());
    }

    #[test]
    fn test_unique_provider_is_critical() {
        let (store, start, end) = setup();
        let solo = Person::faculty("Dr. Solo", "solo@example.com");
        store.insert_person(solo.clone()).unwrap();

        // 20 blocks, Dr. Solo alone on 10 of them
        for offset in 0..10 {
            let date = start + chrono::Duration::days(offset);
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
        assert_eq!(report.n1_vulnerabilities.len(), 1);
        let vulnerability = &report.n1_vulnerabilities[0];
        assert_eq!(vulnerability.severity, "critical");
        assert!(vulnerability.is_unique_provider);
        assert_eq!(vulnerability.affected_blocks, 10);

        let simulation = report
            .n1_simulations
            .iter()
            .find(|s| s.faculty_id == solo.id)
            .unwrap();
        assert_eq!(simulation.uncovered_blocks.len(), 10);
        assert!(simulation.is_critical);
    }

    #[test]
    fn test_fatal_pair_detection() {
        let (store, start, end) = setup();
        let first = Person::faculty("Dr. A", "a@example.com");
        let second = Person::faculty("Dr. B", "b@example.com");
        store.insert_person(first.clone()).unwrap();
        store.insert_person(second.clone()).unwrap();

        // Both cover the same block; losing both leaves it empty
        let block = Block::new(start, TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();
        store
            .insert_assignment(Assignment::new(block.id, first.id, AssignmentRole::Supervising))
            .unwrap();
        store
            .insert_assignment(Assignment::new(block.id, second.id, AssignmentRole::Backup))
            .unwrap();

        let analyzer = ContingencyAnalyzer::new(store);
        let report = analyzer.analyze(start, end, ContingencyOptions::standard());
        assert!(!report.n2_pass);
        assert_eq!(report.n2_fatal_pairs.len(), 1);
        assert_eq!(report.n2_fatal_pairs[0].uncoverable_blocks, 1);
    }

    #[test]
    fn test_severity_ladder_monotone() {
        // More affected blocks never lowers severity
        let order = |s: &str| match s {
            "low" => 0,
            "medium" => 1,
            "high" => 2,
            "critical" => 3,
            _ => -1,
        };
        let mut previous = 0;
        for affected in 0..=50 {
            let severity = order(severity_for(affected, false, 100));
            assert!(severity >= previous);
            previous = severity;
        }
    }

    #[test]
    fn test_phase_transition_indicators() {
        let vulnerability = |severity: &str| VulnerabilityInfo {
            faculty_id: Uuid::new_v4(),
            faculty_name: "F".to_string(),
            severity: severity.to_string(),
            affected_blocks: 1,
            is_unique_provider: false,
            details: String::new(),
        };
        let pair = || FatalPairInfo {
            faculty1_id: Uuid::new_v4(),
            faculty1_name: "A".to_string(),
            faculty2_id: Uuid::new_v4(),
            faculty2_name: "B".to_string(),
            uncoverable_blocks: 1,
        };

        let criticals: Vec<VulnerabilityInfo> =
            (0..3).map(|_| vulnerability("critical")).collect();
        let pairs: Vec<FatalPairInfo> = (0..5).map(|_| pair()).collect();
        let (risk, indicators) = detect_phase_transition(0.96, &criticals, &pairs);
        assert_eq!(risk, "critical");
        assert_eq!(indicators.len(), 3);

        let (risk, _) = detect_phase_transition(0.5, &[], &[]);
        assert_eq!(risk, "low");
    }
}
