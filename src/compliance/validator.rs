//! ACGME work-hour and supervision validation
//!
//! Checks assignments in a date range against the hard regulatory rules:
//! the 80-hour weekly average, the 1-in-7 day-off requirement, supervision
//! ratios per block, and absence overlaps. Hours derive from block counts;
//! every half-day block contributes HOURS_PER_BLOCK.

use crate::constants::{
    HOURS_PER_BLOCK, MAX_CONSECUTIVE_DUTY_DAYS, MAX_WEEKLY_HOURS, ROLLING_WINDOW_DAYS,
    WEEKLY_HOURS_WARNING_RATIO,
};
use crate::domain::{Assignment, Block, Person};
use crate::store::Datastore;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Which rule produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    #[serde(rename = "80_hour_rule")]
    EightyHourRule,
    #[serde(rename = "1_in_7_rule")]
    OneInSevenRule,
    #[serde(rename = "supervision_ratio")]
    SupervisionRatio,
    #[serde(rename = "absence_overlap")]
    AbsenceOverlap,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::EightyHourRule => "80_hour_rule",
            RuleType::OneInSevenRule => "1_in_7_rule",
            RuleType::SupervisionRatio => "supervision_ratio",
            RuleType::AbsenceOverlap => "absence_overlap",
        }
    }
}

/// A single compliance violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule_type: RuleType,
    pub severity: Severity,
    pub person_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub message: String,
    /// Structured rule-specific details
    pub details: serde_json::Value,
    pub suggested_fix: Option<String>,
}

/// Which checks to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplianceOptions {
    pub check_work_hours: bool,
    pub check_supervision: bool,
    pub check_rest_periods: bool,
    pub check_consecutive_duty: bool,
}

impl Default for ComplianceOptions {
    fn default() -> Self {
        Self {
            check_work_hours: true,
            check_supervision: true,
            check_rest_periods: true,
            check_consecutive_duty: true,
        }
    }
}

/// Result of a validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub violations: Vec<Violation>,
    /// Overall compliance in [0, 1]; 1.0 when nothing was checkable
    pub compliance_rate: f64,
    /// Blocks with at least one assignment over workday blocks in range
    pub schedule_coverage_rate: f64,
    pub residents_checked: usize,
    pub blocks_checked: usize,
}

impl ComplianceReport {
    /// Compliance as a percentage rounded to one decimal
    pub fn compliance_rate_pct(&self) -> f64 {
        (self.compliance_rate * 1000.0).round() / 10.0
    }

    pub fn critical_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count()
    }
}

/// ACGME rule validator over the persistence port
pub struct ComplianceValidator {
    store: Arc<dyn Datastore>,
}

impl ComplianceValidator {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Validate every enabled rule over the date range
    pub fn validate(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        options: ComplianceOptions,
    ) -> ComplianceReport {
        let blocks = self.store.blocks_in_range(start_date, end_date);
        let assignments = self.store.assignments_in_range(start_date, end_date);
        let persons = self.store.persons();

        let block_by_id: HashMap<Uuid, &Block> = blocks.iter().map(|b| (b.id, b)).collect();
        let person_by_id: HashMap<Uuid, &Person> = persons.iter().map(|p| (p.id, p)).collect();

        let mut violations: Vec<Violation> = Vec::new();
        let mut checks_total = 0usize;

        let residents: Vec<&Person> = persons.iter().filter(|p| p.is_resident()).collect();

        // Duty dates per resident, derived once
        let mut duty_dates: HashMap<Uuid, BTreeSet<NaiveDate>> = HashMap::new();
        let mut block_counts: HashMap<Uuid, BTreeMap<NaiveDate, usize>> = HashMap::new();
        for assignment in &assignments {
            let Some(block) = block_by_id.get(&assignment.block_id) else {
                continue;
            };
            let Some(person) = person_by_id.get(&assignment.person_id) else {
                continue;
            };
            if person.is_resident() {
                duty_dates
                    .entry(assignment.person_id)
                    .or_default()
                    .insert(block.date);
                *block_counts
                    .entry(assignment.person_id)
                    .or_default()
                    .entry(block.date)
                    .or_insert(0) += 1;
            }
        }

        for resident in &residents {
            let dates = duty_dates.get(&resident.id);
            let counts = block_counts.get(&resident.id);

            if options.check_work_hours {
                checks_total += 1;
                if let Some(counts) = counts {
                    if let Some(violation) =
                        self.check_work_hours(resident, counts, start_date, end_date)
                    {
                        violations.push(violation);
                    }
                }
            }

            if options.check_rest_periods || options.check_consecutive_duty {
                checks_total += 1;
                if let Some(dates) = dates {
                    if let Some(violation) = self.check_consecutive_duty(resident, dates) {
                        violations.push(violation);
                    }
                }
            }
        }

        if options.check_supervision {
            let (supervision_checks, mut supervision_violations) =
                self.check_supervision(&blocks, &assignments, &person_by_id);
            checks_total += supervision_checks;
            violations.append(&mut supervision_violations);
        }

        // Absence overlaps are cheap and always checked
        {
            let absences = self.store.absences();
            for assignment in &assignments {
                let Some(block) = block_by_id.get(&assignment.block_id) else {
                    continue;
                };
                for absence in absences.iter().filter(|a| a.person_id == assignment.person_id) {
                    if absence.covers(block.date) {
                        checks_total += 1;
                        violations.push(Violation {
                            rule_type: RuleType::AbsenceOverlap,
                            severity: Severity::Warning,
                            person_id: Some(assignment.person_id),
                            start_date: absence.start_date,
                            end_date: absence.end_date,
                            message: format!(
                                "Assignment on {} overlaps a {:?} absence",
                                block.date, absence.kind
                            ),
                            details: json!({
                                "assignment_id": assignment.id,
                                "block_date": block.date,
                                "absence_id": absence.id,
                            }),
                            suggested_fix: Some(
                                "Reassign the block or adjust the absence dates".to_string(),
                            ),
                        });
                        break;
                    }
                }
            }
        }

        // Weighted conformance over everything we checked
        let weighted: f64 = violations
            .iter()
            .map(|v| match v.severity {
                Severity::Critical => 1.0,
                Severity::Warning => 0.5,
                Severity::Info => 0.25,
            })
            .sum();
        let compliance_rate = if checks_total == 0 {
            1.0
        } else {
            (1.0 - weighted / checks_total as f64).clamp(0.0, 1.0)
        };

        // Coverage denominator excludes holidays and weekends
        let workday_blocks: Vec<&Block> = blocks
            .iter()
            .filter(|b| !b.is_weekend && !b.is_holiday)
            .collect();
        let covered = workday_blocks
            .iter()
            .filter(|b| assignments.iter().any(|a| a.block_id == b.id))
            .count();
        let schedule_coverage_rate = if workday_blocks.is_empty() {
            1.0
        } else {
            covered as f64 / workday_blocks.len() as f64
        };

        violations.sort_by_key(|v| (v.severity, v.start_date));

        info!(
            violations = violations.len(),
            compliance_rate, "compliance validation completed"
        );

        ComplianceReport {
            period_start: start_date,
            period_end: end_date,
            violations,
            compliance_rate,
            schedule_coverage_rate,
            residents_checked: residents.len(),
            blocks_checked: blocks.len(),
        }
    }

    /// 80-hour rule: ISO-week totals plus rolling 28-day windows anchored at
    /// every distinct duty date. One violation per resident, carrying the
    /// worst numbers observed.
    fn check_work_hours(
        &self,
        resident: &Person,
        block_counts: &BTreeMap<NaiveDate, usize>,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Option<Violation> {
        // Weekly totals by ISO week (Monday start)
        let mut weekly: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for (date, count) in block_counts {
            let week = date.iso_week();
            *weekly.entry((week.year(), week.week())).or_insert(0.0) +=
                *count as f64 * HOURS_PER_BLOCK;
        }
        let max_weekly = weekly.values().cloned().fold(0.0f64, f64::max);
        let average_weekly = if weekly.is_empty() {
            0.0
        } else {
            weekly.values().sum::<f64>() / weekly.len() as f64
        };

        // Rolling 28-day windows, calendar days inclusive
        let mut rolling_peak = 0.0f64;
        let mut rolling_peak_start = period_start;
        for anchor in block_counts.keys() {
            let window_end = *anchor + Duration::days(ROLLING_WINDOW_DAYS - 1);
            let total: f64 = block_counts
                .range(*anchor..=window_end)
                .map(|(_, count)| *count as f64 * HOURS_PER_BLOCK)
                .sum();
            let average = total / 4.0;
            if average > rolling_peak {
                rolling_peak = average;
                rolling_peak_start = *anchor;
            }
        }

        let worst = max_weekly.max(rolling_peak);
        let warning_threshold = WEEKLY_HOURS_WARNING_RATIO * MAX_WEEKLY_HOURS;
        let severity = if worst > MAX_WEEKLY_HOURS {
            Severity::Critical
        } else if worst > warning_threshold {
            Severity::Warning
        } else {
            return None;
        };

        debug!(resident = %resident.name, max_weekly, rolling_peak, "work-hour violation");

        Some(Violation {
            rule_type: RuleType::EightyHourRule,
            severity,
            person_id: Some(resident.id),
            start_date: period_start,
            end_date: period_end,
            message: format!(
                "{} averaged {:.1} hours/week (limit {})",
                resident.name,
                round1(average_weekly),
                MAX_WEEKLY_HOURS
            ),
            details: json!({
                "average_weekly_hours": round1(average_weekly),
                "max_weekly_hours": round1(max_weekly),
                "rolling_window_peak": round1(rolling_peak),
                "rolling_window_start": rolling_peak_start,
                "weeks_analyzed": weekly.len(),
            }),
            suggested_fix: Some("Redistribute blocks to bring weekly hours under 80".to_string()),
        })
    }

    /// 1-in-7 rule: the longest run of consecutive duty days must not exceed 6
    fn check_consecutive_duty(
        &self,
        resident: &Person,
        duty_dates: &BTreeSet<NaiveDate>,
    ) -> Option<Violation> {
        let mut longest_run = 0u32;
        let mut run_start: Option<NaiveDate> = None;
        let mut longest_start: Option<NaiveDate> = None;
        let mut previous: Option<NaiveDate> = None;
        let mut current_run = 0u32;

        for date in duty_dates {
            match previous {
                Some(prev) if *date == prev + Duration::days(1) => {
                    current_run += 1;
                }
                _ => {
                    current_run = 1;
                    run_start = Some(*date);
                }
            }
            if current_run > longest_run {
                longest_run = current_run;
                longest_start = run_start;
            }
            previous = Some(*date);
        }

        if longest_run <= MAX_CONSECUTIVE_DUTY_DAYS {
            return None;
        }

        let start = longest_start?;
        let end = start + Duration::days(longest_run as i64 - 1);
        Some(Violation {
            rule_type: RuleType::OneInSevenRule,
            severity: Severity::Critical,
            person_id: Some(resident.id),
            start_date: start,
            end_date: end,
            message: format!(
                "{} worked {} consecutive days without a day off",
                resident.name, longest_run
            ),
            details: json!({
                "consecutive_days": longest_run,
                "run_start": start,
                "run_end": end,
            }),
            suggested_fix: Some("Insert a duty-free day within every 7-day span".to_string()),
        })
    }

    /// Supervision: required faculty per block = ceil(pgy1/2) + ceil(others/4),
    /// floored at 1, for every block carrying resident assignments
    fn check_supervision(
        &self,
        blocks: &[Block],
        assignments: &[Assignment],
        person_by_id: &HashMap<Uuid, &Person>,
    ) -> (usize, Vec<Violation>) {
        let mut by_block: HashMap<Uuid, Vec<&Assignment>> = HashMap::new();
        for assignment in assignments {
            by_block.entry(assignment.block_id).or_default().push(assignment);
        }

        let mut checks = 0usize;
        let mut violations = Vec::new();

        for block in blocks {
            let Some(block_assignments) = by_block.get(&block.id) else {
                continue;
            };

            let mut pgy1_count = 0usize;
            let mut other_resident_count = 0usize;
            let mut faculty_count = 0usize;
            for assignment in block_assignments {
                match person_by_id.get(&assignment.person_id) {
                    Some(person) if person.is_faculty() => faculty_count += 1,
                    Some(person) => match person.pgy_level() {
                        Some(1) => pgy1_count += 1,
                        Some(_) => other_resident_count += 1,
                        None => {}
                    },
                    None => {}
                }
            }

            if pgy1_count + other_resident_count == 0 {
                continue;
            }
            checks += 1;

            let required = (pgy1_count.div_ceil(2) + other_resident_count.div_ceil(4)).max(1);
            if faculty_count < required {
                violations.push(Violation {
                    rule_type: RuleType::SupervisionRatio,
                    severity: Severity::Critical,
                    person_id: None,
                    start_date: block.date,
                    end_date: block.date,
                    message: format!(
                        "Block on {} {} has {} faculty but needs {}",
                        block.date,
                        block.time_of_day.as_str(),
                        faculty_count,
                        required
                    ),
                    details: json!({
                        "block_id": block.id,
                        "required_faculty": required,
                        "assigned_faculty": faculty_count,
                        "deficit": required - faculty_count,
                        "pgy1_count": pgy1_count,
                        "other_resident_count": other_resident_count,
                    }),
                    suggested_fix: Some("Assign additional supervising faculty".to_string()),
                });
            }
        }

        (checks, violations)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Absence, AbsenceKind, AssignmentRole, TimeOfDay};
    use crate::store::MemoryStore;

    fn seed_day(store: &MemoryStore, person: &Person, date: NaiveDate) {
        for slot in [TimeOfDay::Am, TimeOfDay::Pm] {
            let block = match store.block_on_slot(date, slot) {
                Some(existing) => existing,
                None => {
                    let block = Block::new(date, slot);
                    store.insert_block(block.clone()).unwrap();
                    block
                }
            };
            store
                .insert_assignment(Assignment::new(block.id, person.id, AssignmentRole::Primary))
                .unwrap();
        }
    }

    #[test]
    fn test_empty_range_is_fully_compliant() {
        let store = Arc::new(MemoryStore::new());
        let validator = ComplianceValidator::new(store);
        let report = validator.validate(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            ComplianceOptions::default(),
        );
        assert!(report.violations.is_empty());
        assert_eq!(report.compliance_rate, 1.0);
    }

    #[test]
    fn test_eighty_hour_and_one_in_seven() {
        let store = Arc::new(MemoryStore::new());
        let resident = Person::resident("Dr. R", "r@example.com", 2);
        store.insert_person(resident.clone()).unwrap();

        // 14 consecutive days, AM and PM: 84 hours per ISO week
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        for offset in 0..14 {
            seed_day(&store, &resident, start + Duration::days(offset));
        }

        let validator = ComplianceValidator::new(store);
        let report = validator.validate(
            start,
            NaiveDate::from_ymd_opt(2025, 1, 19).unwrap(),
            ComplianceOptions::default(),
        );

        let eighty: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.rule_type == RuleType::EightyHourRule)
            .collect();
        assert_eq!(eighty.len(), 1);
        assert_eq!(eighty[0].severity, Severity::Critical);
        assert_eq!(eighty[0].details["average_weekly_hours"], 84.0);

        let one_in_seven: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.rule_type == RuleType::OneInSevenRule)
            .collect();
        assert_eq!(one_in_seven.len(), 1);
        assert_eq!(one_in_seven[0].severity, Severity::Critical);
        assert_eq!(one_in_seven[0].details["consecutive_days"], 14);
    }

    #[test]
    fn test_supervision_deficit() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let block = Block::new(date, TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();

        // Three PGY-1s need ceil(3/2) = 2 faculty; none assigned
        for i in 0..3 {
            let resident = Person::resident(format!("R{}", i), format!("r{}@x.org", i), 1);
            store.insert_person(resident.clone()).unwrap();
            store
                .insert_assignment(Assignment::new(block.id, resident.id, AssignmentRole::Primary))
                .unwrap();
        }

        let validator = ComplianceValidator::new(store);
        let report = validator.validate(date, date, ComplianceOptions::default());
        let supervision: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.rule_type == RuleType::SupervisionRatio)
            .collect();
        assert_eq!(supervision.len(), 1);
        assert_eq!(supervision[0].details["required_faculty"], 2);
        assert_eq!(supervision[0].details["deficit"], 2);
    }

    #[test]
    fn test_absence_overlap_is_warning() {
        let store = Arc::new(MemoryStore::new());
        let resident = Person::resident("Dr. R", "r@example.com", 3);
        store.insert_person(resident.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let block = Block::new(date, TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();
        store
            .insert_assignment(Assignment::new(block.id, resident.id, AssignmentRole::Primary))
            .unwrap();
        store
            .insert_absence(Absence::new(resident.id, date, date, AbsenceKind::Vacation))
            .unwrap();

        let validator = ComplianceValidator::new(store);
        let report = validator.validate(date, date, ComplianceOptions::default());
        let overlaps: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.rule_type == RuleType::AbsenceOverlap)
            .collect();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].severity, Severity::Warning);
    }

    #[test]
    fn test_warning_band_below_limit() {
        let store = Arc::new(MemoryStore::new());
        let resident = Person::resident("Dr. R", "r@example.com", 2);
        store.insert_person(resident.clone()).unwrap();

        // 13 blocks in one ISO week: 78 hours, above the 76-hour warning band
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        for offset in 0..6 {
            seed_day(&store, &resident, monday + Duration::days(offset));
        }
        let sunday = monday + Duration::days(6);
        let block = Block::new(sunday, TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();
        store
            .insert_assignment(Assignment::new(block.id, resident.id, AssignmentRole::Primary))
            .unwrap();

        let validator = ComplianceValidator::new(store.clone());
        let options = ComplianceOptions {
            check_rest_periods: false,
            check_consecutive_duty: false,
            ..ComplianceOptions::default()
        };
        let report = validator.validate(monday, sunday, options);
        let eighty: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.rule_type == RuleType::EightyHourRule)
            .collect();
        assert_eq!(eighty.len(), 1);
        assert_eq!(eighty[0].severity, Severity::Warning);
    }
}
