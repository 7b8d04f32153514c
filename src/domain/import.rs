//! Import staging records: batches and their staged rows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportBatchStatus {
    Staged,
    Approved,
    Applied,
    RolledBack,
    Rejected,
    Failed,
}

impl ImportBatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportBatchStatus::Staged => "staged",
            ImportBatchStatus::Approved => "approved",
            ImportBatchStatus::Applied => "applied",
            ImportBatchStatus::RolledBack => "rolled_back",
            ImportBatchStatus::Rejected => "rejected",
            ImportBatchStatus::Failed => "failed",
        }
    }

    /// Statuses participating in the duplicate-file check
    pub fn is_active(&self) -> bool {
        matches!(self, ImportBatchStatus::Staged | ImportBatchStatus::Approved)
    }
}

/// How conflicts with existing assignments are resolved at apply time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Update the existing assignment in place
    Upsert,
    /// Skip rows whose target already exists
    Merge,
    /// Delete the existing assignment and insert the staged one
    Replace,
}

/// Conflict classification for a staged row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same person, same date, same rotation
    Duplicate,
    /// Same person, same date, different rotation
    Overwrite,
}

/// One staged import (an uploaded file awaiting review)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub filename: String,
    /// SHA-256 of the uploaded bytes, hex encoded
    pub file_hash: String,
    pub file_size_bytes: usize,
    pub status: ImportBatchStatus,
    pub conflict_resolution: ConflictResolution,
    pub target_start_date: Option<NaiveDate>,
    pub target_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub row_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<Uuid>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rolled_back_by: Option<Uuid>,
    pub rollback_available: bool,
    pub rollback_expires_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    pub fn new(filename: impl Into<String>, file_hash: impl Into<String>, file_size_bytes: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            created_by: None,
            filename: filename.into(),
            file_hash: file_hash.into(),
            file_size_bytes,
            status: ImportBatchStatus::Staged,
            conflict_resolution: ConflictResolution::Upsert,
            target_start_date: None,
            target_end_date: None,
            notes: None,
            row_count: 0,
            error_count: 0,
            warning_count: 0,
            applied_at: None,
            applied_by: None,
            rolled_back_at: None,
            rolled_back_by: None,
            rollback_available: false,
            rollback_expires_at: None,
        }
    }
}

/// Per-row staged record, owned by its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedAssignmentStatus {
    Pending,
    Approved,
    Applied,
    Skipped,
    Failed,
}

/// A parsed and matched row awaiting apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStagedAssignment {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub row_number: usize,
    pub person_name: String,
    pub assignment_date: NaiveDate,
    pub slot: Option<String>,
    pub rotation_name: Option<String>,
    pub matched_person_id: Option<Uuid>,
    /// 0-100 similarity score for the person match
    pub person_match_confidence: Option<u8>,
    pub matched_rotation_id: Option<Uuid>,
    pub rotation_match_confidence: Option<u8>,
    pub conflict_kind: Option<ConflictKind>,
    pub existing_assignment_id: Option<Uuid>,
    pub status: StagedAssignmentStatus,
    pub created_assignment_id: Option<Uuid>,
    pub validation_errors: Vec<String>,
    pub validation_warnings: Vec<String>,
}

impl ImportStagedAssignment {
    pub fn new(
        batch_id: Uuid,
        row_number: usize,
        person_name: impl Into<String>,
        assignment_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            row_number,
            person_name: person_name.into(),
            assignment_date,
            slot: None,
            rotation_name: None,
            matched_person_id: None,
            person_match_confidence: None,
            matched_rotation_id: None,
            rotation_match_confidence: None,
            conflict_kind: None,
            existing_assignment_id: None,
            status: StagedAssignmentStatus::Pending,
            created_assignment_id: None,
            validation_errors: Vec::new(),
            validation_warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_statuses() {
        assert!(ImportBatchStatus::Staged.is_active());
        assert!(ImportBatchStatus::Approved.is_active());
        assert!(!ImportBatchStatus::Applied.is_active());
        assert!(!ImportBatchStatus::Rejected.is_active());
    }
}
