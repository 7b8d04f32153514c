//! Compliance report generation
//!
//! Compiles the validator's findings together with per-resident work-hour
//! breakdowns, supervision ratios, leave utilization, coverage metrics, and
//! weekly trend series. Rendering to PDF or Excel is a concern of the
//! layers above; this module produces the data.

use crate::compliance::validator::{
    ComplianceOptions, ComplianceValidator, RuleType, Violation,
};
use crate::constants::{HOURS_PER_BLOCK, MAX_WEEKLY_HOURS, ROLLING_WINDOW_DAYS};
use crate::domain::{Absence, Assignment, Block, Person};
use crate::store::Datastore;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One rolling 4-week window for a resident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub total_hours: f64,
    pub avg_weekly_hours: f64,
    pub exceeds_limit: bool,
}

/// Per-resident compliance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidentComplianceSummary {
    pub resident_id: Uuid,
    pub resident_name: String,
    pub pgy_level: u8,
    pub total_assignments: usize,
    pub total_hours: f64,
    pub avg_weekly_hours: f64,
    pub max_weekly_hours: f64,
    /// Monday of each ISO week -> hours worked
    pub hours_by_week: BTreeMap<NaiveDate, f64>,
    pub rolling_averages: Vec<RollingWindow>,
    pub total_absence_days: i64,
    pub absence_by_kind: BTreeMap<String, i64>,
    pub violations: Vec<Violation>,
    pub has_violations: bool,
}

/// Aggregate work-hour statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkHourSummary {
    pub total_residents: usize,
    pub residents_with_violations: usize,
    pub total_violations: usize,
    pub avg_weekly_hours: f64,
    pub max_weekly_hours: f64,
    /// Residents without violations, as a percentage
    pub compliance_rate_pct: f64,
}

/// One under-supervised block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionShortfall {
    pub block_id: Uuid,
    pub block_date: NaiveDate,
    pub residents: usize,
    pub pgy1_count: usize,
    pub faculty: usize,
    pub required_faculty: usize,
    pub deficit: usize,
}

/// Supervision ratio statistics for the period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionSummary {
    pub total_blocks: usize,
    pub blocks_with_violations: usize,
    pub shortfalls: Vec<SupervisionShortfall>,
    pub compliance_rate_pct: f64,
}

/// Leave usage for the period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveUtilization {
    pub total_absence_days: i64,
    pub avg_absence_days_per_resident: f64,
    pub absence_rate_pct: f64,
    pub absence_by_kind: BTreeMap<String, i64>,
    pub most_common_kind: Option<String>,
}

/// Schedule coverage for the period; weekends and holidays are excluded
/// from the denominator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub total_workday_blocks: usize,
    pub assigned_blocks: usize,
    pub unassigned_blocks: usize,
    pub coverage_rate_pct: f64,
    pub assignments_by_role: BTreeMap<String, usize>,
}

/// One week of a trend series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub value: f64,
}

/// Weekly time series for hours, coverage, and absences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendData {
    pub weekly_hours: Vec<TrendPoint>,
    pub coverage: Vec<TrendPoint>,
    pub absence_days: Vec<TrendPoint>,
}

/// Filters applied when generating a report
#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    pub resident_ids: Option<Vec<Uuid>>,
    pub pgy_levels: Option<Vec<u8>>,
    pub violations_only: bool,
}

/// Complete compliance report payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReportData {
    pub generated_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub resident_summaries: Vec<ResidentComplianceSummary>,
    pub work_hour_summary: WorkHourSummary,
    pub supervision_summary: SupervisionSummary,
    pub leave_utilization: LeaveUtilization,
    pub coverage_metrics: CoverageMetrics,
    pub trend_data: TrendData,
}

/// Builds compliance report data over the persistence port
pub struct ComplianceReportGenerator {
    store: Arc<dyn Datastore>,
    validator: ComplianceValidator,
}

impl ComplianceReportGenerator {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        let validator = ComplianceValidator::new(store.clone());
        Self { store, validator }
    }

    /// Compile the full report for a period
    pub fn generate(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filters: &ReportFilters,
    ) -> ComplianceReportData {
        let mut residents: Vec<Person> = self
            .store
            .persons()
            .into_iter()
            .filter(|p| p.is_resident())
            .filter(|p| {
                filters
                    .resident_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&p.id))
            })
            .filter(|p| {
                filters
                    .pgy_levels
                    .as_ref()
                    .map_or(true, |levels| p.pgy_level().map_or(false, |l| levels.contains(&l)))
            })
            .collect();
        residents.sort_by_key(|p| (p.pgy_level(), p.name.clone()));

        let assignments = self.store.assignments_in_range(start_date, end_date);
        let blocks = self.store.blocks_in_range(start_date, end_date);
        let block_by_id: HashMap<Uuid, &Block> = blocks.iter().map(|b| (b.id, b)).collect();
        let absences: Vec<Absence> = self
            .store
            .absences()
            .into_iter()
            .filter(|a| a.start_date <= end_date && a.end_date >= start_date)
            .collect();

        // One validator pass; violations group by subject afterwards
        let validation = self
            .validator
            .validate(start_date, end_date, ComplianceOptions::default());
        let mut violations_by_person: HashMap<Uuid, Vec<Violation>> = HashMap::new();
        for violation in &validation.violations {
            if let Some(person_id) = violation.person_id {
                violations_by_person
                    .entry(person_id)
                    .or_default()
                    .push(violation.clone());
            }
        }

        let mut resident_summaries = Vec::new();
        for resident in &residents {
            let summary = self.analyze_resident(
                resident,
                &assignments,
                &block_by_id,
                &absences,
                violations_by_person.remove(&resident.id).unwrap_or_default(),
                start_date,
                end_date,
            );
            if filters.violations_only && !summary.has_violations {
                continue;
            }
            resident_summaries.push(summary);
        }

        let work_hour_summary = work_hour_summary(&resident_summaries);
        let supervision_summary =
            self.supervision_summary(&assignments, &block_by_id, &validation.violations);
        let leave_utilization =
            leave_utilization(&absences, residents.len(), start_date, end_date);
        let coverage_metrics = coverage_metrics(&assignments, &blocks);
        let trend_data = trend_data(&assignments, &block_by_id, &blocks, &absences, start_date, end_date);

        info!(
            residents = resident_summaries.len(),
            violations = validation.violations.len(),
            "compliance report generated"
        );

        ComplianceReportData {
            generated_at: Utc::now(),
            period_start: start_date,
            period_end: end_date,
            resident_summaries,
            work_hour_summary,
            supervision_summary,
            leave_utilization,
            coverage_metrics,
            trend_data,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_resident(
        &self,
        resident: &Person,
        assignments: &[Assignment],
        block_by_id: &HashMap<Uuid, &Block>,
        absences: &[Absence],
        violations: Vec<Violation>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ResidentComplianceSummary {
        let own: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| a.person_id == resident.id)
            .collect();

        // Hours keyed by the Monday of each ISO week
        let mut hours_by_week: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut hours_by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for assignment in &own {
            let Some(block) = block_by_id.get(&assignment.block_id) else {
                continue;
            };
            let week_start =
                block.date - Duration::days(block.date.weekday().num_days_from_monday() as i64);
            *hours_by_week.entry(week_start).or_insert(0.0) += HOURS_PER_BLOCK;
            *hours_by_date.entry(block.date).or_insert(0.0) += HOURS_PER_BLOCK;
        }

        let rolling_averages: Vec<RollingWindow> = hours_by_date
            .keys()
            .map(|window_start| {
                let window_end = *window_start + Duration::days(ROLLING_WINDOW_DAYS - 1);
                let total_hours: f64 = hours_by_date
                    .range(*window_start..=window_end)
                    .map(|(_, hours)| hours)
                    .sum();
                let avg_weekly_hours = round1(total_hours / 4.0);
                RollingWindow {
                    window_start: *window_start,
                    window_end,
                    total_hours,
                    avg_weekly_hours,
                    exceeds_limit: avg_weekly_hours > MAX_WEEKLY_HOURS,
                }
            })
            .collect();

        let own_absences: Vec<&Absence> = absences
            .iter()
            .filter(|a| a.person_id == resident.id)
            .collect();
        let mut absence_by_kind: BTreeMap<String, i64> = BTreeMap::new();
        let mut total_absence_days = 0i64;
        for absence in &own_absences {
            let overlap_start = absence.start_date.max(start_date);
            let overlap_end = absence.end_date.min(end_date);
            if overlap_start <= overlap_end {
                let days = (overlap_end - overlap_start).num_days() + 1;
                total_absence_days += days;
                *absence_by_kind
                    .entry(format!("{:?}", absence.kind).to_lowercase())
                    .or_insert(0) += days;
            }
        }

        let max_weekly_hours = hours_by_week.values().cloned().fold(0.0f64, f64::max);
        let avg_weekly_hours = if hours_by_week.is_empty() {
            0.0
        } else {
            hours_by_week.values().sum::<f64>() / hours_by_week.len() as f64
        };

        ResidentComplianceSummary {
            resident_id: resident.id,
            resident_name: resident.name.clone(),
            pgy_level: resident.pgy_level().unwrap_or(0),
            total_assignments: own.len(),
            total_hours: own.len() as f64 * HOURS_PER_BLOCK,
            avg_weekly_hours: round1(avg_weekly_hours),
            max_weekly_hours: round1(max_weekly_hours),
            hours_by_week,
            rolling_averages,
            total_absence_days,
            absence_by_kind,
            has_violations: !violations.is_empty(),
            violations,
        }
    }

    fn supervision_summary(
        &self,
        assignments: &[Assignment],
        block_by_id: &HashMap<Uuid, &Block>,
        violations: &[Violation],
    ) -> SupervisionSummary {
        let staffed_blocks: HashSet<Uuid> = assignments.iter().map(|a| a.block_id).collect();
        let total_blocks = staffed_blocks.len();

        let shortfalls: Vec<SupervisionShortfall> = violations
            .iter()
            .filter(|v| v.rule_type == RuleType::SupervisionRatio)
            .filter_map(|v| {
                let block_id = v.details.get("block_id")?.as_str()?.parse().ok()?;
                let block = block_by_id.get(&block_id)?;
                let pgy1_count = v.details["pgy1_count"].as_u64()? as usize;
                let other = v.details["other_resident_count"].as_u64()? as usize;
                Some(SupervisionShortfall {
                    block_id,
                    block_date: block.date,
                    residents: pgy1_count + other,
                    pgy1_count,
                    faculty: v.details["assigned_faculty"].as_u64()? as usize,
                    required_faculty: v.details["required_faculty"].as_u64()? as usize,
                    deficit: v.details["deficit"].as_u64()? as usize,
                })
            })
            .collect();

        let blocks_with_violations = shortfalls.len();
        let compliance_rate_pct = if total_blocks > 0 {
            round1((total_blocks - blocks_with_violations) as f64 / total_blocks as f64 * 100.0)
        } else {
            100.0
        };

        SupervisionSummary {
            total_blocks,
            blocks_with_violations,
            shortfalls,
            compliance_rate_pct,
        }
    }
}

fn work_hour_summary(summaries: &[ResidentComplianceSummary]) -> WorkHourSummary {
    if summaries.is_empty() {
        return WorkHourSummary {
            total_residents: 0,
            residents_with_violations: 0,
            total_violations: 0,
            avg_weekly_hours: 0.0,
            max_weekly_hours: 0.0,
            compliance_rate_pct: 100.0,
        };
    }

    let total_residents = summaries.len();
    let residents_with_violations = summaries.iter().filter(|s| s.has_violations).count();
    let total_violations = summaries.iter().map(|s| s.violations.len()).sum();
    let avg_weekly_hours =
        summaries.iter().map(|s| s.avg_weekly_hours).sum::<f64>() / total_residents as f64;
    let max_weekly_hours = summaries
        .iter()
        .map(|s| s.max_weekly_hours)
        .fold(0.0f64, f64::max);

    WorkHourSummary {
        total_residents,
        residents_with_violations,
        total_violations,
        avg_weekly_hours: round1(avg_weekly_hours),
        max_weekly_hours: round1(max_weekly_hours),
        compliance_rate_pct: round1(
            (total_residents - residents_with_violations) as f64 / total_residents as f64 * 100.0,
        ),
    }
}

fn leave_utilization(
    absences: &[Absence],
    resident_count: usize,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> LeaveUtilization {
    let mut total_absence_days = 0i64;
    let mut absence_by_kind: BTreeMap<String, i64> = BTreeMap::new();

    for absence in absences {
        let overlap_start = absence.start_date.max(start_date);
        let overlap_end = absence.end_date.min(end_date);
        if overlap_start <= overlap_end {
            let days = (overlap_end - overlap_start).num_days() + 1;
            total_absence_days += days;
            *absence_by_kind
                .entry(format!("{:?}", absence.kind).to_lowercase())
                .or_insert(0) += days;
        }
    }

    let avg_absence_days_per_resident = if resident_count > 0 {
        total_absence_days as f64 / resident_count as f64
    } else {
        0.0
    };
    let period_days = (end_date - start_date).num_days() + 1;
    let total_possible_days = resident_count as i64 * period_days;
    let absence_rate_pct = if total_possible_days > 0 {
        total_absence_days as f64 / total_possible_days as f64 * 100.0
    } else {
        0.0
    };
    let most_common_kind = absence_by_kind
        .iter()
        .max_by_key(|(_, days)| **days)
        .map(|(kind, _)| kind.clone());

    LeaveUtilization {
        total_absence_days,
        avg_absence_days_per_resident: round1(avg_absence_days_per_resident),
        absence_rate_pct: round1(absence_rate_pct),
        absence_by_kind,
        most_common_kind,
    }
}

fn coverage_metrics(assignments: &[Assignment], blocks: &[Block]) -> CoverageMetrics {
    let workday_blocks: Vec<&Block> = blocks
        .iter()
        .filter(|b| !b.is_weekend && !b.is_holiday)
        .collect();
    let workday_ids: HashSet<Uuid> = workday_blocks.iter().map(|b| b.id).collect();
    let assigned: HashSet<Uuid> = assignments
        .iter()
        .map(|a| a.block_id)
        .filter(|id| workday_ids.contains(id))
        .collect();

    let mut assignments_by_role: BTreeMap<String, usize> = BTreeMap::new();
    for assignment in assignments {
        *assignments_by_role
            .entry(assignment.role.as_str().to_string())
            .or_insert(0) += 1;
    }

    let total = workday_blocks.len();
    CoverageMetrics {
        total_workday_blocks: total,
        assigned_blocks: assigned.len(),
        unassigned_blocks: total.saturating_sub(assigned.len()),
        coverage_rate_pct: if total > 0 {
            round1(assigned.len() as f64 / total as f64 * 100.0)
        } else {
            0.0
        },
        assignments_by_role,
    }
}

fn trend_data(
    assignments: &[Assignment],
    block_by_id: &HashMap<Uuid, &Block>,
    blocks: &[Block],
    absences: &[Absence],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> TrendData {
    let mut trend = TrendData::default();

    let mut current = start_date;
    while current <= end_date {
        let week_end = (current + Duration::days(6)).min(end_date);

        let week_assignments: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| {
                block_by_id
                    .get(&a.block_id)
                    .map_or(false, |b| b.date >= current && b.date <= week_end)
            })
            .collect();
        let total_hours = week_assignments.len() as f64 * HOURS_PER_BLOCK;

        let week_blocks = blocks
            .iter()
            .filter(|b| !b.is_weekend && b.date >= current && b.date <= week_end)
            .count();
        let assigned: HashSet<Uuid> = week_assignments.iter().map(|a| a.block_id).collect();
        let coverage_rate = if week_blocks > 0 {
            assigned.len() as f64 / week_blocks as f64 * 100.0
        } else {
            0.0
        };

        let absence_days: i64 = absences
            .iter()
            .filter(|a| a.start_date <= week_end && a.end_date >= current)
            .map(|a| (a.end_date.min(week_end) - a.start_date.max(current)).num_days() + 1)
            .sum();

        trend.weekly_hours.push(TrendPoint {
            week_start: current,
            week_end,
            value: total_hours,
        });
        trend.coverage.push(TrendPoint {
            week_start: current,
            week_end,
            value: round1(coverage_rate),
        });
        trend.absence_days.push(TrendPoint {
            week_start: current,
            week_end,
            value: absence_days as f64,
        });

        current = week_end + Duration::days(1);
    }

    trend
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AbsenceKind, AssignmentRole, TimeOfDay};
    use crate::store::MemoryStore;

    fn seed_week(store: &MemoryStore, person: &Person, start: NaiveDate, days: i64) {
        for offset in 0..days {
            let date = start + Duration::days(offset);
            let block = Block::new(date, TimeOfDay::Am);
            store.insert_block(block.clone()).unwrap();
            store
                .insert_assignment(Assignment::new(block.id, person.id, AssignmentRole::Primary))
                .unwrap();
        }
    }

    #[test]
    fn test_empty_report() {
        let store = Arc::new(MemoryStore::new());
        let generator = ComplianceReportGenerator::new(store);
        let report = generator.generate(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            &ReportFilters::default(),
        );
        assert!(report.resident_summaries.is_empty());
        assert_eq!(report.work_hour_summary.compliance_rate_pct, 100.0);
        assert_eq!(report.coverage_metrics.total_workday_blocks, 0);
    }

    #[test]
    fn test_resident_summary_hours() {
        let store = Arc::new(MemoryStore::new());
        let resident = Person::resident("Dr. R", "r@example.com", 2);
        store.insert_person(resident.clone()).unwrap();

        // Mon-Fri, one AM block a day: 30 hours in one ISO week
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        seed_week(&store, &resident, monday, 5);
        store
            .insert_absence(Absence::new(
                resident.id,
                monday + Duration::days(7),
                monday + Duration::days(9),
                AbsenceKind::Vacation,
            ))
            .unwrap();

        let generator = ComplianceReportGenerator::new(store);
        let report = generator.generate(
            monday,
            monday + Duration::days(13),
            &ReportFilters::default(),
        );

        assert_eq!(report.resident_summaries.len(), 1);
        let summary = &report.resident_summaries[0];
        assert_eq!(summary.total_assignments, 5);
        assert_eq!(summary.total_hours, 30.0);
        assert_eq!(summary.max_weekly_hours, 30.0);
        assert_eq!(summary.hours_by_week.get(&monday), Some(&30.0));
        assert_eq!(summary.total_absence_days, 3);
        assert_eq!(summary.absence_by_kind.get("vacation"), Some(&3));
        assert!(!summary.has_violations);

        // Rolling windows anchored at each duty date
        assert_eq!(summary.rolling_averages.len(), 5);
        assert!(!summary.rolling_averages[0].exceeds_limit);

        assert_eq!(report.leave_utilization.total_absence_days, 3);
        assert_eq!(
            report.leave_utilization.most_common_kind.as_deref(),
            Some("vacation")
        );
        assert_eq!(report.coverage_metrics.assigned_blocks, 5);
        assert_eq!(report.coverage_metrics.coverage_rate_pct, 100.0);
        assert_eq!(report.trend_data.weekly_hours.len(), 2);
        assert_eq!(report.trend_data.weekly_hours[0].value, 30.0);
    }

    #[test]
    fn test_violations_only_filter() {
        let store = Arc::new(MemoryStore::new());
        let quiet = Person::resident("Dr. Quiet", "q@example.com", 2);
        let busy = Person::resident("Dr. Busy", "b@example.com", 3);
        store.insert_person(quiet.clone()).unwrap();
        store.insert_person(busy.clone()).unwrap();

        // Dr. Busy works 8 consecutive days and trips the 1-in-7 rule
        let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        seed_week(&store, &busy, start, 8);

        let generator = ComplianceReportGenerator::new(store);
        let filters = ReportFilters {
            violations_only: true,
            ..ReportFilters::default()
        };
        let report = generator.generate(start, start + Duration::days(10), &filters);

        assert_eq!(report.resident_summaries.len(), 1);
        assert_eq!(report.resident_summaries[0].resident_name, "Dr. Busy");
        assert!(report.work_hour_summary.residents_with_violations >= 1);
    }

    #[test]
    fn test_pgy_filter() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_person(Person::resident("Dr. One", "1@example.com", 1))
            .unwrap();
        store
            .insert_person(Person::resident("Dr. Two", "2@example.com", 2))
            .unwrap();

        let generator = ComplianceReportGenerator::new(store);
        let filters = ReportFilters {
            pgy_levels: Some(vec![1]),
            ..ReportFilters::default()
        };
        let report = generator.generate(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            &filters,
        );
        assert_eq!(report.resident_summaries.len(), 1);
        assert_eq!(report.resident_summaries[0].pgy_level, 1);
    }
}
