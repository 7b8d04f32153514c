//! Import staging pipeline
//!
//! Five operations over a strict state machine: stage, preview, apply,
//! rollback (within 24h), reject. Apply and rollback run inside transactional
//! scopes serialized on the store, and staging a file whose hash matches an
//! active batch is refused.

pub mod matching;
pub mod workbook;

use crate::compliance::{ComplianceOptions, ComplianceValidator};
use crate::config::ImportConfig;
use crate::constants::{FUZZY_MATCH_THRESHOLD, ROLLBACK_WINDOW_HOURS};
use crate::domain::{
    Assignment, AssignmentRole, Block, ConflictKind, ConflictResolution, ImportBatch,
    ImportBatchStatus, ImportStagedAssignment, StagedAssignmentStatus, TimeOfDay,
};
use crate::error::{CoreError, CoreResult};
use crate::import::matching::FuzzyMatcher;
use crate::import::workbook::parse_workbook;
use crate::store::Datastore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Options for staging an upload
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub created_by: Option<Uuid>,
    pub conflict_resolution: Option<ConflictResolution>,
    pub target_start_date: Option<NaiveDate>,
    pub target_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub sheet_name: Option<String>,
}

/// Result of staging an import
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub success: bool,
    pub batch_id: Option<Uuid>,
    pub message: String,
    pub error_code: Option<String>,
    pub row_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

impl StageResult {
    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            batch_id: None,
            message: message.into(),
            error_code: Some(code.to_string()),
            row_count: 0,
            error_count: 0,
            warning_count: 0,
        }
    }
}

/// A staged-vs-existing comparison row
#[derive(Debug, Clone, Serialize)]
pub struct PreviewConflict {
    pub staged_assignment_id: Uuid,
    pub existing_assignment_id: Option<Uuid>,
    pub person_name: String,
    pub assignment_date: NaiveDate,
    pub slot: Option<String>,
    pub staged_rotation: Option<String>,
    pub conflict_kind: ConflictKind,
}

/// Result of previewing a batch
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub batch_id: Uuid,
    pub new_count: usize,
    pub update_count: usize,
    pub conflict_count: usize,
    pub skip_count: usize,
    pub staged_assignments: Vec<ImportStagedAssignment>,
    pub conflicts: Vec<PreviewConflict>,
    pub compliance_warnings: Vec<String>,
    pub total_staged: usize,
}

/// Per-row apply failure
#[derive(Debug, Clone, Serialize)]
pub struct ApplyError {
    pub staged_assignment_id: Uuid,
    pub row_number: usize,
    pub person_name: String,
    pub assignment_date: NaiveDate,
    pub error_message: String,
}

/// Result of applying a batch
#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub success: bool,
    pub batch_id: Uuid,
    pub status: ImportBatchStatus,
    pub applied_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<ApplyError>,
    pub compliance_warnings: Vec<String>,
    pub rollback_available: bool,
    pub rollback_expires_at: Option<DateTime<Utc>>,
    pub message: String,
    pub error_code: Option<String>,
}

impl ApplyResult {
    fn failure(batch_id: Uuid, status: ImportBatchStatus, code: &str, message: String) -> Self {
        Self {
            success: false,
            batch_id,
            status,
            applied_count: 0,
            skipped_count: 0,
            error_count: 0,
            errors: Vec::new(),
            compliance_warnings: Vec::new(),
            rollback_available: false,
            rollback_expires_at: None,
            message,
            error_code: Some(code.to_string()),
        }
    }
}

/// Result of rolling back a batch
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub success: bool,
    pub batch_id: Uuid,
    pub status: ImportBatchStatus,
    pub rolled_back_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub message: String,
    pub error_code: Option<String>,
}

impl RollbackResult {
    fn failure(batch_id: Uuid, status: ImportBatchStatus, code: &str, message: String) -> Self {
        Self {
            success: false,
            batch_id,
            status,
            rolled_back_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            message,
            error_code: Some(code.to_string()),
        }
    }
}

/// The import staging service
pub struct ImportStagingService {
    store: Arc<dyn Datastore>,
    config: ImportConfig,
}

impl ImportStagingService {
    pub fn new(store: Arc<dyn Datastore>, config: ImportConfig) -> Self {
        Self { store, config }
    }

    /// Parse a workbook, fuzzy-match rows, and persist the staged batch
    pub fn stage_import(
        &self,
        file_bytes: &[u8],
        filename: &str,
        options: StageOptions,
    ) -> CoreResult<StageResult> {
        let file_hash = hex::encode(Sha256::digest(file_bytes));

        if let Some(existing) = self.store.active_batch_by_hash(&file_hash) {
            return Ok(StageResult::failure(
                "DUPLICATE_FILE",
                format!(
                    "Duplicate file detected. Existing batch {} has the same content.",
                    existing.id
                ),
            ));
        }

        let parsed = match parse_workbook(file_bytes, options.sheet_name.as_deref()) {
            Ok(parsed) => parsed,
            Err(CoreError::Parse(message)) => {
                return Ok(StageResult::failure("PARSE_ERROR", message))
            }
            Err(err) => return Err(err),
        };

        // Fuzzy-match dictionaries over current people and rotations
        let person_matcher = FuzzyMatcher::new(
            self.store.persons().into_iter().map(|p| (p.name, p.id)),
        );
        let rotation_matcher = FuzzyMatcher::new(
            self.store
                .rotation_templates()
                .into_iter()
                .filter(|t| !t.is_archived)
                .map(|t| (t.name, t.id)),
        );

        let mut batch = ImportBatch::new(filename, file_hash, file_bytes.len());
        batch.created_by = options.created_by;
        batch.conflict_resolution = options
            .conflict_resolution
            .unwrap_or(ConflictResolution::Upsert);
        batch.target_start_date = options.target_start_date;
        batch.target_end_date = options.target_end_date;
        batch.notes = options.notes;
        batch.row_count = parsed.rows.len();

        let mut error_count = 0usize;
        let mut warning_count = parsed.warnings.len();
        let mut staged_rows: Vec<ImportStagedAssignment> = Vec::new();

        for row in &parsed.rows {
            let mut errors = row.errors.clone();
            let mut warnings: Vec<String> = Vec::new();

            let Some(person_name) = row.person_name.clone() else {
                error_count += 1;
                continue;
            };
            let Some(assignment_date) = row.assignment_date else {
                error_count += 1;
                continue;
            };

            let (matched_person_id, person_confidence) = person_matcher.match_name(&person_name);
            if person_confidence < FUZZY_MATCH_THRESHOLD {
                warnings.push(format!(
                    "Low confidence person match: {} ({}%)",
                    person_name, person_confidence
                ));
            }

            let mut matched_rotation_id = None;
            let mut rotation_confidence = 0u8;
            if let Some(rotation_name) = &row.rotation_name {
                let (matched, confidence) = rotation_matcher.match_name(rotation_name);
                matched_rotation_id = matched;
                rotation_confidence = confidence;
                if confidence < FUZZY_MATCH_THRESHOLD {
                    warnings.push(format!(
                        "Low confidence rotation match: {} ({}%)",
                        rotation_name, confidence
                    ));
                }
            }

            // Conflict detection against existing assignments on the date
            let mut conflict_kind = None;
            let mut existing_assignment_id = None;
            if let Some(person_id) = matched_person_id {
                for block in self.store.blocks_on(assignment_date) {
                    if let Some(existing) = self.store.assignment_for(block.id, person_id) {
                        existing_assignment_id = Some(existing.id);
                        conflict_kind = if matched_rotation_id.is_some()
                            && existing.rotation_template_id == matched_rotation_id
                        {
                            Some(ConflictKind::Duplicate)
                        } else {
                            Some(ConflictKind::Overwrite)
                        };
                        break;
                    }
                }
            }

            if !errors.is_empty() {
                error_count += 1;
            }
            warning_count += warnings.len();

            let mut staged =
                ImportStagedAssignment::new(batch.id, row.row_number, person_name, assignment_date);
            staged.slot = row.slot.clone();
            staged.rotation_name = row.rotation_name.clone();
            staged.matched_person_id = matched_person_id;
            staged.person_match_confidence = matched_person_id.map(|_| person_confidence);
            staged.matched_rotation_id = matched_rotation_id;
            staged.rotation_match_confidence = matched_rotation_id.map(|_| rotation_confidence);
            staged.conflict_kind = conflict_kind;
            staged.existing_assignment_id = existing_assignment_id;
            staged.validation_errors = std::mem::take(&mut errors);
            staged.validation_warnings = warnings;
            staged_rows.push(staged);
        }

        batch.error_count = error_count;
        batch.warning_count = warning_count;
        let batch_id = batch.id;
        let row_count = batch.row_count;

        // Batch and children persist in one transaction
        let store = &self.store;
        let batch_for_txn = batch.clone();
        store.transaction(&mut || {
            store.insert_batch(batch_for_txn.clone())?;
            for staged in &staged_rows {
                store.insert_staged(staged.clone())?;
            }
            Ok(())
        })?;

        info!(
            %batch_id,
            rows = row_count,
            errors = error_count,
            warnings = warning_count,
            "staged import batch"
        );

        Ok(StageResult {
            success: true,
            batch_id: Some(batch_id),
            message: format!("Successfully staged {} rows", row_count),
            error_code: None,
            row_count,
            error_count,
            warning_count,
        })
    }

    /// Paginated staged-vs-existing comparison with conflict counts
    pub fn get_batch_preview(
        &self,
        batch_id: Uuid,
        page: usize,
        page_size: usize,
        include_compliance: bool,
    ) -> CoreResult<PreviewResult> {
        let batch = self
            .store
            .batch(batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("import batch {}", batch_id)))?;

        let all_rows = self.store.staged_for_batch(batch_id);

        let mut new_count = 0usize;
        let mut update_count = 0usize;
        let mut conflict_count = 0usize;
        let mut skip_count = 0usize;
        let mut conflicts = Vec::new();

        for staged in &all_rows {
            match (staged.status, staged.conflict_kind) {
                (StagedAssignmentStatus::Skipped, _) => skip_count += 1,
                (_, Some(kind)) => {
                    match kind {
                        ConflictKind::Overwrite => update_count += 1,
                        ConflictKind::Duplicate => conflict_count += 1,
                    }
                    conflicts.push(PreviewConflict {
                        staged_assignment_id: staged.id,
                        existing_assignment_id: staged.existing_assignment_id,
                        person_name: staged.person_name.clone(),
                        assignment_date: staged.assignment_date,
                        slot: staged.slot.clone(),
                        staged_rotation: staged.rotation_name.clone(),
                        conflict_kind: kind,
                    });
                }
                _ => new_count += 1,
            }
        }

        let compliance_warnings = if include_compliance {
            self.forward_compliance_warnings(&batch, &all_rows)
        } else {
            Vec::new()
        };

        let total_staged = all_rows.len();
        let offset = page.saturating_sub(1) * page_size;
        let staged_assignments = all_rows.into_iter().skip(offset).take(page_size).collect();

        Ok(PreviewResult {
            batch_id,
            new_count,
            update_count,
            conflict_count,
            skip_count,
            staged_assignments,
            conflicts,
            compliance_warnings,
            total_staged,
        })
    }

    /// Validate the hypothetical post-apply state: apply rows inside a scope,
    /// run the validator, then abort the scope so nothing persists
    fn forward_compliance_warnings(
        &self,
        batch: &ImportBatch,
        rows: &[ImportStagedAssignment],
    ) -> Vec<String> {
        let (Some(start), Some(end)) = (batch.target_start_date, batch.target_end_date) else {
            return Vec::new();
        };

        let store = &self.store;
        let mut warnings = Vec::new();
        let resolution = batch.conflict_resolution;
        let result = store.transaction(&mut || {
            for staged in rows {
                if matches!(
                    staged.status,
                    StagedAssignmentStatus::Pending | StagedAssignmentStatus::Approved
                ) {
                    let _ = self.apply_single(staged, resolution);
                }
            }
            let validator = ComplianceValidator::new(self.store.clone());
            let report = validator.validate(start, end, ComplianceOptions::default());
            warnings = report
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.severity.as_str(), v.message))
                .collect();
            // Abort the scope; the preview must not mutate anything
            Err(CoreError::Conflict("preview only".to_string()))
        });
        debug_assert!(result.is_err());
        warnings
    }

    /// Apply staged rows to the live assignments table
    pub fn apply_batch(
        &self,
        batch_id: Uuid,
        applied_by: Option<Uuid>,
        conflict_resolution: Option<ConflictResolution>,
        dry_run: bool,
        validate_compliance: bool,
    ) -> CoreResult<ApplyResult> {
        let store = &self.store;
        let mut outcome: Option<ApplyResult> = None;

        let txn_result = store.transaction(&mut || {
            let Some(mut batch) = store.batch(batch_id) else {
                outcome = Some(ApplyResult::failure(
                    batch_id,
                    ImportBatchStatus::Failed,
                    "BATCH_NOT_FOUND",
                    "Batch not found".to_string(),
                ));
                return Ok(());
            };

            if !batch.status.is_active() {
                outcome = Some(ApplyResult::failure(
                    batch_id,
                    batch.status,
                    "INVALID_STATUS",
                    format!("Cannot apply batch with status: {}", batch.status.as_str()),
                ));
                return Ok(());
            }

            let resolution = conflict_resolution.unwrap_or(batch.conflict_resolution);
            let staged_rows: Vec<ImportStagedAssignment> = store
                .staged_for_batch(batch_id)
                .into_iter()
                .filter(|s| {
                    matches!(
                        s.status,
                        StagedAssignmentStatus::Pending | StagedAssignmentStatus::Approved
                    )
                })
                .collect();

            if dry_run {
                outcome = Some(ApplyResult {
                    success: true,
                    batch_id,
                    status: batch.status,
                    applied_count: staged_rows.len(),
                    skipped_count: 0,
                    error_count: 0,
                    errors: Vec::new(),
                    compliance_warnings: Vec::new(),
                    rollback_available: false,
                    rollback_expires_at: None,
                    message: format!("Dry run: would apply {} assignments", staged_rows.len()),
                    error_code: None,
                });
                return Ok(());
            }

            let mut applied_count = 0usize;
            let mut skipped_count = 0usize;
            let mut errors: Vec<ApplyError> = Vec::new();

            for staged in staged_rows {
                let mut updated = staged.clone();
                match self.apply_single(&staged, resolution) {
                    Ok(Some(created_id)) => {
                        updated.status = StagedAssignmentStatus::Applied;
                        updated.created_assignment_id = Some(created_id);
                        applied_count += 1;
                    }
                    Ok(None) => {
                        updated.status = StagedAssignmentStatus::Skipped;
                        skipped_count += 1;
                    }
                    Err(err) => {
                        warn!(staged_id = %staged.id, error = %err, "failed to apply staged row");
                        updated.status = StagedAssignmentStatus::Failed;
                        errors.push(ApplyError {
                            staged_assignment_id: staged.id,
                            row_number: staged.row_number,
                            person_name: staged.person_name.clone(),
                            assignment_date: staged.assignment_date,
                            error_message: err.to_string(),
                        });
                    }
                }
                store.update_staged(updated)?;
            }

            let now = Utc::now();
            batch.status = ImportBatchStatus::Applied;
            batch.applied_at = Some(now);
            batch.applied_by = applied_by;
            batch.rollback_available = true;
            batch.rollback_expires_at = Some(now + Duration::hours(ROLLBACK_WINDOW_HOURS));
            store.update_batch(batch.clone())?;

            let compliance_warnings = if validate_compliance && applied_count > 0 {
                match (batch.target_start_date, batch.target_end_date) {
                    (Some(start), Some(end)) => {
                        let validator = ComplianceValidator::new(self.store.clone());
                        let report = validator.validate(start, end, ComplianceOptions::default());
                        report
                            .violations
                            .iter()
                            .map(|v| format!("{}: {}", v.severity.as_str(), v.message))
                            .collect()
                    }
                    _ => Vec::new(),
                }
            } else {
                Vec::new()
            };

            info!(
                %batch_id,
                applied = applied_count,
                skipped = skipped_count,
                errors = errors.len(),
                "applied import batch"
            );

            outcome = Some(ApplyResult {
                success: errors.is_empty(),
                batch_id,
                status: batch.status,
                applied_count,
                skipped_count,
                error_count: errors.len(),
                errors,
                compliance_warnings,
                rollback_available: true,
                rollback_expires_at: batch.rollback_expires_at,
                message: format!("Applied {} assignments", applied_count),
                error_code: None,
            });
            Ok(())
        });

        txn_result?;
        outcome.ok_or_else(|| CoreError::Internal("apply produced no result".to_string()))
    }

    /// Apply one staged row; Ok(None) means skipped under merge resolution
    fn apply_single(
        &self,
        staged: &ImportStagedAssignment,
        resolution: ConflictResolution,
    ) -> CoreResult<Option<Uuid>> {
        let Some(person_id) = staged.matched_person_id else {
            return Ok(None);
        };

        let slot = staged
            .slot
            .as_deref()
            .map(TimeOfDay::parse_or_am)
            .unwrap_or(TimeOfDay::Am);
        let block = match self.store.block_on_slot(staged.assignment_date, slot) {
            Some(block) => block,
            None => {
                if !self.config.create_missing_blocks {
                    return Err(CoreError::NotFound(format!(
                        "block for {} {}",
                        staged.assignment_date,
                        slot.as_str()
                    )));
                }
                let block = Block::new(staged.assignment_date, slot);
                self.store.insert_block(block.clone())?;
                block
            }
        };

        if let Some(existing) = self.store.assignment_for(block.id, person_id) {
            match resolution {
                ConflictResolution::Merge => return Ok(None),
                ConflictResolution::Upsert => {
                    let mut updated = existing.clone();
                    if staged.matched_rotation_id.is_some() {
                        updated.rotation_template_id = staged.matched_rotation_id;
                    }
                    updated.notes =
                        Some(format!("Updated via import batch at {}", Utc::now().to_rfc3339()));
                    self.store.update_assignment(updated)?;
                    return Ok(Some(existing.id));
                }
                ConflictResolution::Replace => {
                    self.store.delete_assignment(existing.id)?;
                }
            }
        }

        let mut assignment = Assignment::new(block.id, person_id, AssignmentRole::Primary)
            .with_creator("import_staging");
        assignment.rotation_template_id = staged.matched_rotation_id;
        assignment.notes = Some(format!(
            "Created via import batch at {}",
            Utc::now().to_rfc3339()
        ));
        let assignment_id = assignment.id;
        self.store.insert_assignment(assignment)?;
        Ok(Some(assignment_id))
    }

    /// Undo an applied batch within the rollback window
    pub fn rollback_batch(
        &self,
        batch_id: Uuid,
        rolled_back_by: Option<Uuid>,
        reason: Option<&str>,
    ) -> CoreResult<RollbackResult> {
        let store = &self.store;
        let mut outcome: Option<RollbackResult> = None;
        let reason = reason.map(String::from);

        let txn_result = store.transaction(&mut || {
            let Some(mut batch) = store.batch(batch_id) else {
                outcome = Some(RollbackResult::failure(
                    batch_id,
                    ImportBatchStatus::Failed,
                    "BATCH_NOT_FOUND",
                    "Batch not found".to_string(),
                ));
                return Ok(());
            };

            if batch.status != ImportBatchStatus::Applied {
                outcome = Some(RollbackResult::failure(
                    batch_id,
                    batch.status,
                    "INVALID_STATUS",
                    format!("Cannot rollback batch with status: {}", batch.status.as_str()),
                ));
                return Ok(());
            }

            if !batch.rollback_available {
                outcome = Some(RollbackResult::failure(
                    batch_id,
                    batch.status,
                    "ROLLBACK_NOT_AVAILABLE",
                    "Rollback not available for this batch".to_string(),
                ));
                return Ok(());
            }

            // At exactly the expiry instant rollback is still allowed
            if let Some(expires_at) = batch.rollback_expires_at {
                if Utc::now() > expires_at {
                    outcome = Some(RollbackResult::failure(
                        batch_id,
                        batch.status,
                        "ROLLBACK_WINDOW_EXPIRED",
                        format!(
                            "Rollback window of {} hours has expired",
                            ROLLBACK_WINDOW_HOURS
                        ),
                    ));
                    return Ok(());
                }
            }

            let mut rolled_back_count = 0usize;
            let mut failed_count = 0usize;
            let mut errors = Vec::new();

            for staged in store.staged_for_batch(batch_id) {
                if staged.status != StagedAssignmentStatus::Applied {
                    continue;
                }
                let Some(created_id) = staged.created_assignment_id else {
                    continue;
                };
                match store.delete_assignment(created_id) {
                    Ok(deleted) => {
                        if deleted {
                            rolled_back_count += 1;
                        }
                        let mut updated = staged.clone();
                        updated.status = StagedAssignmentStatus::Pending;
                        updated.created_assignment_id = None;
                        store.update_staged(updated)?;
                    }
                    Err(err) => {
                        warn!(staged_id = %staged.id, error = %err, "failed to rollback staged row");
                        failed_count += 1;
                        errors.push(err.to_string());
                    }
                }
            }

            batch.status = ImportBatchStatus::RolledBack;
            batch.rolled_back_at = Some(Utc::now());
            batch.rolled_back_by = rolled_back_by;
            batch.rollback_available = false;
            if let Some(reason) = &reason {
                batch.notes = Some(match batch.notes.take() {
                    Some(notes) => format!("{}\nRollback reason: {}", notes, reason),
                    None => format!("Rollback reason: {}", reason),
                });
            }
            store.update_batch(batch.clone())?;

            info!(
                %batch_id,
                rolled_back = rolled_back_count,
                failed = failed_count,
                "rolled back import batch"
            );

            outcome = Some(RollbackResult {
                success: failed_count == 0,
                batch_id,
                status: batch.status,
                rolled_back_count,
                failed_count,
                errors,
                message: format!("Rolled back {} assignments", rolled_back_count),
                error_code: None,
            });
            Ok(())
        });

        txn_result?;
        outcome.ok_or_else(|| CoreError::Internal("rollback produced no result".to_string()))
    }

    /// Reject a batch, deleting its staged rows. Rejecting an already
    /// rejected batch is a no-op success; applied batches must be rolled
    /// back first.
    pub fn reject_batch(&self, batch_id: Uuid) -> CoreResult<(bool, String)> {
        let Some(mut batch) = self.store.batch(batch_id) else {
            return Ok((false, "Batch not found".to_string()));
        };

        if batch.status == ImportBatchStatus::Applied {
            return Ok((
                false,
                "Cannot reject an applied batch. Use rollback first.".to_string(),
            ));
        }
        if batch.status == ImportBatchStatus::Rejected {
            return Ok((true, "Batch already rejected".to_string()));
        }

        self.store.delete_staged_for_batch(batch_id);
        batch.status = ImportBatchStatus::Rejected;
        self.store.update_batch(batch)?;
        info!(%batch_id, "rejected import batch");
        Ok((true, "Batch rejected successfully".to_string()))
    }

    /// Fetch a batch by id
    pub fn get_batch(&self, batch_id: Uuid) -> Option<ImportBatch> {
        self.store.batch(batch_id)
    }

    /// List batches, newest first
    pub fn list_batches(
        &self,
        page: usize,
        page_size: usize,
        status: Option<ImportBatchStatus>,
    ) -> (Vec<ImportBatch>, usize) {
        self.store.batches_page(page, page_size, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Person;
    use crate::store::MemoryStore;

    fn service() -> (ImportStagingService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ImportStagingService::new(store.clone(), ImportConfig::default());
        (service, store)
    }

    fn staged_row(batch_id: Uuid, person_id: Uuid, date: NaiveDate) -> ImportStagedAssignment {
        let mut staged = ImportStagedAssignment::new(batch_id, 1, "Dr. Smith", date);
        staged.matched_person_id = Some(person_id);
        staged.person_match_confidence = Some(100);
        staged
    }

    #[test]
    fn test_apply_creates_block_on_demand() {
        let (service, store) = service();
        let person = Person::resident("Dr. Smith", "smith@example.com", 2);
        store.insert_person(person.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

        let batch = ImportBatch::new("roster.xlsx", "hash-a", 100);
        store.insert_batch(batch.clone()).unwrap();
        store
            .insert_staged(staged_row(batch.id, person.id, date))
            .unwrap();

        let result = service
            .apply_batch(batch.id, None, None, false, false)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.applied_count, 1);
        assert!(store.block_on_slot(date, TimeOfDay::Am).is_some());
    }

    #[test]
    fn test_apply_refuses_missing_block_when_configured() {
        let store = Arc::new(MemoryStore::new());
        let config = ImportConfig {
            create_missing_blocks: false,
            ..ImportConfig::default()
        };
        let service = ImportStagingService::new(store.clone(), config);

        let person = Person::resident("Dr. Smith", "smith@example.com", 2);
        store.insert_person(person.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

        let batch = ImportBatch::new("roster.xlsx", "hash-b", 100);
        store.insert_batch(batch.clone()).unwrap();
        store
            .insert_staged(staged_row(batch.id, person.id, date))
            .unwrap();

        let result = service
            .apply_batch(batch.id, None, None, false, false)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_count, 1);
        assert!(store.block_on_slot(date, TimeOfDay::Am).is_none());
    }

    #[test]
    fn test_apply_rejects_wrong_status() {
        let (service, store) = service();
        let mut batch = ImportBatch::new("roster.xlsx", "hash-c", 100);
        batch.status = ImportBatchStatus::Rejected;
        store.insert_batch(batch.clone()).unwrap();

        let result = service
            .apply_batch(batch.id, None, None, false, false)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("INVALID_STATUS"));
    }

    #[test]
    fn test_dry_run_counts_without_applying() {
        let (service, store) = service();
        let person = Person::resident("Dr. Smith", "smith@example.com", 2);
        store.insert_person(person.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

        let batch = ImportBatch::new("roster.xlsx", "hash-d", 100);
        store.insert_batch(batch.clone()).unwrap();
        store
            .insert_staged(staged_row(batch.id, person.id, date))
            .unwrap();

        let result = service
            .apply_batch(batch.id, None, None, true, false)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.applied_count, 1);
        assert_eq!(store.assignments().len(), 0);
        assert_eq!(store.batch(batch.id).unwrap().status, ImportBatchStatus::Staged);
    }

    #[test]
    fn test_reject_is_idempotent() {
        let (service, store) = service();
        let batch = ImportBatch::new("roster.xlsx", "hash-e", 100);
        store.insert_batch(batch.clone()).unwrap();

        let (ok, _) = service.reject_batch(batch.id).unwrap();
        assert!(ok);
        let (ok_again, message) = service.reject_batch(batch.id).unwrap();
        assert!(ok_again);
        assert!(message.contains("already rejected"));
    }

    #[test]
    fn test_rollback_requires_applied_status() {
        let (service, store) = service();
        let batch = ImportBatch::new("roster.xlsx", "hash-f", 100);
        store.insert_batch(batch.clone()).unwrap();

        let result = service.rollback_batch(batch.id, None, None).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("INVALID_STATUS"));
    }

    #[test]
    fn test_rollback_window_expiry() {
        let (service, store) = service();
        let person = Person::resident("Dr. Smith", "smith@example.com", 2);
        store.insert_person(person.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

        let batch = ImportBatch::new("roster.xlsx", "hash-g", 100);
        store.insert_batch(batch.clone()).unwrap();
        store
            .insert_staged(staged_row(batch.id, person.id, date))
            .unwrap();

        let applied = service
            .apply_batch(batch.id, None, None, false, false)
            .unwrap();
        assert!(applied.success);

        // Force the window into the past
        let mut expired = store.batch(batch.id).unwrap();
        expired.rollback_expires_at = Some(Utc::now() - Duration::seconds(1));
        store.update_batch(expired).unwrap();

        let result = service.rollback_batch(batch.id, None, None).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("ROLLBACK_WINDOW_EXPIRED"));
    }
}
