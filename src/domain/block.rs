//! Half-day coverage blocks, the atomic unit of assignment

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AM or PM half-day slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Am,
    Pm,
}

impl TimeOfDay {
    /// Parse a slot label ("AM"/"PM", case-insensitive); defaults to AM
    pub fn parse_or_am(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("pm") {
            TimeOfDay::Pm
        } else {
            TimeOfDay::Am
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Am => "AM",
            TimeOfDay::Pm => "PM",
        }
    }
}

/// A half-day coverage slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub date: NaiveDate,
    pub time_of_day: TimeOfDay,
    /// 1-based slot number within the day
    pub block_number: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

impl Block {
    /// Construct a block; weekend flag derives from the date
    pub fn new(date: NaiveDate, time_of_day: TimeOfDay) -> Self {
        let block_number = match time_of_day {
            TimeOfDay::Am => 1,
            TimeOfDay::Pm => 2,
        };
        Self {
            id: Uuid::new_v4(),
            date,
            time_of_day,
            block_number,
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_holiday: false,
        }
    }

    pub fn holiday(mut self) -> Self {
        self.is_holiday = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekend_derivation() {
        // 2025-01-04 is a Saturday
        let saturday = Block::new(NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(), TimeOfDay::Am);
        assert!(saturday.is_weekend);
        let monday = Block::new(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), TimeOfDay::Pm);
        assert!(!monday.is_weekend);
        assert_eq!(monday.block_number, 2);
    }

    #[test]
    fn test_slot_parsing() {
        assert_eq!(TimeOfDay::parse_or_am("pm"), TimeOfDay::Pm);
        assert_eq!(TimeOfDay::parse_or_am(" PM "), TimeOfDay::Pm);
        assert_eq!(TimeOfDay::parse_or_am("morning"), TimeOfDay::Am);
    }
}
