//! Entity persistence port

use crate::domain::{
    Absence, Assignment, Block, CalendarSubscription, ImportBatch, ImportBatchStatus,
    ImportStagedAssignment, Person, Procedure, RotationTemplate, SwapRecord, TimeOfDay,
    WebhookDelivery, WebhookEndpoint,
};
use crate::error::CoreResult;
use chrono::NaiveDate;
use uuid::Uuid;

/// Persistence interface consumed by the core.
///
/// `transaction` provides an atomic scope: mutations made inside the closure
/// are rolled back if it returns an error. Scopes on the same store serialize
/// against each other, which also supplies the row-lock semantics apply and
/// rollback need on a batch.
pub trait Datastore: Send + Sync {
    // People (read-only reference data plus seeding)
    fn insert_person(&self, person: Person) -> CoreResult<()>;
    fn person(&self, id: Uuid) -> Option<Person>;
    fn persons(&self) -> Vec<Person>;

    // Blocks
    fn insert_block(&self, block: Block) -> CoreResult<()>;
    fn block(&self, id: Uuid) -> Option<Block>;
    fn blocks_on(&self, date: NaiveDate) -> Vec<Block>;
    fn block_on_slot(&self, date: NaiveDate, slot: TimeOfDay) -> Option<Block>;
    fn blocks_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<Block>;

    // Rotation templates
    fn insert_rotation_template(&self, template: RotationTemplate) -> CoreResult<()>;
    fn rotation_template(&self, id: Uuid) -> Option<RotationTemplate>;
    fn rotation_templates(&self) -> Vec<RotationTemplate>;
    fn update_rotation_template(&self, template: RotationTemplate) -> CoreResult<()>;

    // Assignments (unique on (block_id, person_id))
    fn insert_assignment(&self, assignment: Assignment) -> CoreResult<()>;
    fn update_assignment(&self, assignment: Assignment) -> CoreResult<()>;
    fn delete_assignment(&self, id: Uuid) -> CoreResult<bool>;
    fn assignment(&self, id: Uuid) -> Option<Assignment>;
    fn assignment_for(&self, block_id: Uuid, person_id: Uuid) -> Option<Assignment>;
    fn assignments(&self) -> Vec<Assignment>;
    fn assignments_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<Assignment>;
    fn assignments_for_person(&self, person_id: Uuid) -> Vec<Assignment>;

    // Absences
    fn insert_absence(&self, absence: Absence) -> CoreResult<()>;
    fn absences(&self) -> Vec<Absence>;
    fn absences_for(&self, person_id: Uuid) -> Vec<Absence>;

    // Procedures
    fn insert_procedure(&self, procedure: Procedure) -> CoreResult<()>;
    fn procedures(&self) -> Vec<Procedure>;

    // Swaps
    fn insert_swap(&self, swap: SwapRecord) -> CoreResult<()>;
    fn swaps(&self) -> Vec<SwapRecord>;

    // Import batches and staged rows
    fn insert_batch(&self, batch: ImportBatch) -> CoreResult<()>;
    fn batch(&self, id: Uuid) -> Option<ImportBatch>;
    fn update_batch(&self, batch: ImportBatch) -> CoreResult<()>;
    fn active_batch_by_hash(&self, file_hash: &str) -> Option<ImportBatch>;
    fn batches_page(
        &self,
        page: usize,
        page_size: usize,
        status: Option<ImportBatchStatus>,
    ) -> (Vec<ImportBatch>, usize);
    fn insert_staged(&self, staged: ImportStagedAssignment) -> CoreResult<()>;
    fn update_staged(&self, staged: ImportStagedAssignment) -> CoreResult<()>;
    fn staged_for_batch(&self, batch_id: Uuid) -> Vec<ImportStagedAssignment>;
    fn delete_staged_for_batch(&self, batch_id: Uuid) -> usize;

    // Webhooks
    fn insert_webhook_endpoint(&self, endpoint: WebhookEndpoint) -> CoreResult<()>;
    fn webhook_endpoint(&self, id: Uuid) -> Option<WebhookEndpoint>;
    fn update_webhook_endpoint(&self, endpoint: WebhookEndpoint) -> CoreResult<()>;
    fn webhook_delivery(&self, delivery_id: &str) -> Option<WebhookDelivery>;
    fn record_webhook_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()>;

    // Calendar subscriptions
    fn insert_subscription(&self, subscription: CalendarSubscription) -> CoreResult<()>;
    fn subscription_by_token(&self, token: &str) -> Option<CalendarSubscription>;
    fn update_subscription(&self, subscription: CalendarSubscription) -> CoreResult<()>;

    /// Monotonic id advanced by every committed transaction; reports record it
    /// so stale analyses can be detected.
    fn transaction_id(&self) -> u64;

    /// Run `f` atomically. An error rolls back every mutation made inside.
    fn transaction(&self, f: &mut dyn FnMut() -> CoreResult<()>) -> CoreResult<()>;
}
