//! Rotation templates

use crate::constants::CRITICAL_SERVICES;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reusable rotation definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationTemplate {
    pub id: Uuid,
    pub name: String,
    /// Free-form activity tag; some tags are critical services
    pub activity_type: String,
    pub abbreviation: Option<String>,
    pub max_residents: Option<u32>,
    pub supervision_required: bool,
    pub max_supervision_ratio: Option<f64>,
    pub clinic_location: Option<String>,
    /// Soft-delete flag
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<Uuid>,
}

impl RotationTemplate {
    pub fn new(name: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            activity_type: activity_type.into(),
            abbreviation: None,
            max_residents: None,
            supervision_required: false,
            max_supervision_ratio: None,
            clinic_location: None,
            is_archived: false,
            archived_at: None,
            archived_by: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.clinic_location = Some(location.into());
        self
    }

    /// Whether this rotation's activity is a critical service
    pub fn is_critical_service(&self) -> bool {
        let tag = self.activity_type.to_lowercase();
        CRITICAL_SERVICES.contains(&tag.as_str())
    }

    /// Mark archived, recording who and when
    pub fn archive(&mut self, archived_by: Option<Uuid>) {
        self.is_archived = true;
        self.archived_at = Some(Utc::now());
        self.archived_by = archived_by;
    }

    /// Clear the soft-delete flag
    pub fn restore(&mut self) {
        self.is_archived = false;
        self.archived_at = None;
        self.archived_by = None;
    }
}
