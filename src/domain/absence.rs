//! Absences: date ranges during which a person is unavailable

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Absence classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceKind {
    Vacation,
    Medical,
    FamilyEmergency,
    Deployment,
    MilitaryTdy,
    Conference,
    Other,
}

/// An inclusive date range of unavailability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    pub id: Uuid,
    pub person_id: Uuid,
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
    pub kind: AbsenceKind,
    pub deployment_orders: bool,
}

impl Absence {
    pub fn new(person_id: Uuid, start_date: NaiveDate, end_date: NaiveDate, kind: AbsenceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            person_id,
            start_date,
            end_date,
            kind,
            deployment_orders: false,
        }
    }

    /// Inclusive duration in days
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Whether a date falls within this absence
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_inclusive() {
        let absence = Absence::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            AbsenceKind::Vacation,
        );
        assert_eq!(absence.duration_days(), 7);
        assert!(absence.covers(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()));
        assert!(!absence.covers(NaiveDate::from_ymd_opt(2025, 3, 8).unwrap()));
    }
}
