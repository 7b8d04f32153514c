//! Assignments: a person covering a block

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a person on a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    Primary,
    Backup,
    Supervising,
}

impl AssignmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentRole::Primary => "primary",
            AssignmentRole::Backup => "backup",
            AssignmentRole::Supervising => "supervising",
        }
    }
}

/// A single block assignment. At most one exists per (block_id, person_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub block_id: Uuid,
    pub person_id: Uuid,
    pub rotation_template_id: Option<Uuid>,
    pub role: AssignmentRole,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Assignment {
    pub fn new(block_id: Uuid, person_id: Uuid, role: AssignmentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            block_id,
            person_id,
            rotation_template_id: None,
            role,
            notes: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    pub fn with_rotation(mut self, rotation_template_id: Uuid) -> Self {
        self.rotation_template_id = Some(rotation_template_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}
