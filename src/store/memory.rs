//! In-memory datastore
//!
//! Complete single-process implementation of the persistence port. Mutable
//! tables are snapshot at transaction entry and restored on error, and
//! transactions serialize on a store-wide guard, which doubles as the
//! row-level lock apply/rollback take on a batch.

use crate::domain::{
    Absence, Assignment, Block, CalendarSubscription, ImportBatch, ImportBatchStatus,
    ImportStagedAssignment, Person, Procedure, RotationTemplate, SwapRecord, TimeOfDay,
    WebhookDelivery, WebhookEndpoint,
};
use crate::error::{CoreError, CoreResult};
use crate::store::Datastore;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use uuid::Uuid;

const TRANSACTION_MAX_RETRIES: u32 = 3;

/// In-process datastore backed by concurrent maps
#[derive(Default)]
pub struct MemoryStore {
    persons: DashMap<Uuid, Person>,
    blocks: DashMap<Uuid, Block>,
    rotation_templates: DashMap<Uuid, RotationTemplate>,
    assignments: DashMap<Uuid, Assignment>,
    /// Unique index enforcing one assignment per (block, person)
    assignment_index: DashMap<(Uuid, Uuid), Uuid>,
    absences: DashMap<Uuid, Absence>,
    procedures: DashMap<Uuid, Procedure>,
    swaps: DashMap<Uuid, SwapRecord>,
    batches: DashMap<Uuid, ImportBatch>,
    staged: DashMap<Uuid, ImportStagedAssignment>,
    webhooks: DashMap<Uuid, WebhookEndpoint>,
    deliveries: DashMap<String, WebhookDelivery>,
    subscriptions: DashMap<String, CalendarSubscription>,
    txn_guard: Mutex<()>,
    txn_id: AtomicU64,
}

struct Snapshot {
    blocks: Vec<(Uuid, Block)>,
    assignments: Vec<(Uuid, Assignment)>,
    assignment_index: Vec<((Uuid, Uuid), Uuid)>,
    batches: Vec<(Uuid, ImportBatch)>,
    staged: Vec<(Uuid, ImportStagedAssignment)>,
    swaps: Vec<(Uuid, SwapRecord)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            blocks: self.blocks.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            assignments: self
                .assignments
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            assignment_index: self
                .assignment_index
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
            batches: self.batches.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            staged: self.staged.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            swaps: self.swaps.iter().map(|e| (*e.key(), e.value().clone())).collect(),
        }
    }

    fn restore(&self, snapshot: Snapshot) {
        self.blocks.clear();
        for (k, v) in snapshot.blocks {
            self.blocks.insert(k, v);
        }
        self.assignments.clear();
        for (k, v) in snapshot.assignments {
            self.assignments.insert(k, v);
        }
        self.assignment_index.clear();
        for (k, v) in snapshot.assignment_index {
            self.assignment_index.insert(k, v);
        }
        self.batches.clear();
        for (k, v) in snapshot.batches {
            self.batches.insert(k, v);
        }
        self.staged.clear();
        for (k, v) in snapshot.staged {
            self.staged.insert(k, v);
        }
        self.swaps.clear();
        for (k, v) in snapshot.swaps {
            self.swaps.insert(k, v);
        }
    }
}

impl Datastore for MemoryStore {
    fn insert_person(&self, person: Person) -> CoreResult<()> {
        self.persons.insert(person.id, person);
        Ok(())
    }

    fn person(&self, id: Uuid) -> Option<Person> {
        self.persons.get(&id).map(|e| e.value().clone())
    }

    fn persons(&self) -> Vec<Person> {
        let mut all: Vec<Person> = self.persons.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn insert_block(&self, block: Block) -> CoreResult<()> {
        self.blocks.insert(block.id, block);
        Ok(())
    }

    fn block(&self, id: Uuid) -> Option<Block> {
        self.blocks.get(&id).map(|e| e.value().clone())
    }

    fn blocks_on(&self, date: NaiveDate) -> Vec<Block> {
        let mut found: Vec<Block> = self
            .blocks
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|b| b.block_number);
        found
    }

    fn block_on_slot(&self, date: NaiveDate, slot: TimeOfDay) -> Option<Block> {
        self.blocks
            .iter()
            .find(|e| e.date == date && e.time_of_day == slot)
            .map(|e| e.value().clone())
    }

    fn blocks_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<Block> {
        let mut found: Vec<Block> = self
            .blocks
            .iter()
            .filter(|e| e.date >= start && e.date <= end)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|b| (b.date, b.block_number));
        found
    }

    fn insert_rotation_template(&self, template: RotationTemplate) -> CoreResult<()> {
        self.rotation_templates.insert(template.id, template);
        Ok(())
    }

    fn rotation_template(&self, id: Uuid) -> Option<RotationTemplate> {
        self.rotation_templates.get(&id).map(|e| e.value().clone())
    }

    fn rotation_templates(&self) -> Vec<RotationTemplate> {
        let mut all: Vec<RotationTemplate> =
            self.rotation_templates.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn update_rotation_template(&self, template: RotationTemplate) -> CoreResult<()> {
        if !self.rotation_templates.contains_key(&template.id) {
            return Err(CoreError::NotFound(format!("rotation template {}", template.id)));
        }
        self.rotation_templates.insert(template.id, template);
        Ok(())
    }

    fn insert_assignment(&self, assignment: Assignment) -> CoreResult<()> {
        let key = (assignment.block_id, assignment.person_id);
        if self.assignment_index.contains_key(&key) {
            return Err(CoreError::Conflict(format!(
                "assignment already exists for block {} person {}",
                assignment.block_id, assignment.person_id
            )));
        }
        self.assignment_index.insert(key, assignment.id);
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn update_assignment(&self, assignment: Assignment) -> CoreResult<()> {
        let existing = self
            .assignments
            .get(&assignment.id)
            .map(|e| (e.block_id, e.person_id))
            .ok_or_else(|| CoreError::NotFound(format!("assignment {}", assignment.id)))?;
        let new_key = (assignment.block_id, assignment.person_id);
        if existing != new_key {
            if self.assignment_index.contains_key(&new_key) {
                return Err(CoreError::Conflict(format!(
                    "assignment already exists for block {} person {}",
                    assignment.block_id, assignment.person_id
                )));
            }
            self.assignment_index.remove(&existing);
            self.assignment_index.insert(new_key, assignment.id);
        }
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn delete_assignment(&self, id: Uuid) -> CoreResult<bool> {
        match self.assignments.remove(&id) {
            Some((_, assignment)) => {
                self.assignment_index
                    .remove(&(assignment.block_id, assignment.person_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn assignment(&self, id: Uuid) -> Option<Assignment> {
        self.assignments.get(&id).map(|e| e.value().clone())
    }

    fn assignment_for(&self, block_id: Uuid, person_id: Uuid) -> Option<Assignment> {
        let id = *self.assignment_index.get(&(block_id, person_id))?;
        self.assignment(id)
    }

    fn assignments(&self) -> Vec<Assignment> {
        self.assignments.iter().map(|e| e.value().clone()).collect()
    }

    fn assignments_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<Assignment> {
        let block_ids: std::collections::HashSet<Uuid> = self
            .blocks
            .iter()
            .filter(|e| e.date >= start && e.date <= end)
            .map(|e| e.id)
            .collect();
        let mut found: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|e| block_ids.contains(&e.block_id))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|a| a.created_at);
        found
    }

    fn assignments_for_person(&self, person_id: Uuid) -> Vec<Assignment> {
        self.assignments
            .iter()
            .filter(|e| e.person_id == person_id)
            .map(|e| e.value().clone())
            .collect()
    }

    fn insert_absence(&self, absence: Absence) -> CoreResult<()> {
        self.absences.insert(absence.id, absence);
        Ok(())
    }

    fn absences(&self) -> Vec<Absence> {
        self.absences.iter().map(|e| e.value().clone()).collect()
    }

    fn absences_for(&self, person_id: Uuid) -> Vec<Absence> {
        self.absences
            .iter()
            .filter(|e| e.person_id == person_id)
            .map(|e| e.value().clone())
            .collect()
    }

    fn insert_procedure(&self, procedure: Procedure) -> CoreResult<()> {
        self.procedures.insert(procedure.id, procedure);
        Ok(())
    }

    fn procedures(&self) -> Vec<Procedure> {
        self.procedures.iter().map(|e| e.value().clone()).collect()
    }

    fn insert_swap(&self, swap: SwapRecord) -> CoreResult<()> {
        self.swaps.insert(swap.id, swap);
        Ok(())
    }

    fn swaps(&self) -> Vec<SwapRecord> {
        self.swaps.iter().map(|e| e.value().clone()).collect()
    }

    fn insert_batch(&self, batch: ImportBatch) -> CoreResult<()> {
        self.batches.insert(batch.id, batch);
        Ok(())
    }

    fn batch(&self, id: Uuid) -> Option<ImportBatch> {
        self.batches.get(&id).map(|e| e.value().clone())
    }

    fn update_batch(&self, batch: ImportBatch) -> CoreResult<()> {
        if !self.batches.contains_key(&batch.id) {
            return Err(CoreError::NotFound(format!("import batch {}", batch.id)));
        }
        self.batches.insert(batch.id, batch);
        Ok(())
    }

    fn active_batch_by_hash(&self, file_hash: &str) -> Option<ImportBatch> {
        self.batches
            .iter()
            .find(|e| e.file_hash == file_hash && e.status.is_active())
            .map(|e| e.value().clone())
    }

    fn batches_page(
        &self,
        page: usize,
        page_size: usize,
        status: Option<ImportBatchStatus>,
    ) -> (Vec<ImportBatch>, usize) {
        let mut all: Vec<ImportBatch> = self
            .batches
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len();
        let start = page.saturating_sub(1) * page_size;
        let items = all.into_iter().skip(start).take(page_size).collect();
        (items, total)
    }

    fn insert_staged(&self, staged: ImportStagedAssignment) -> CoreResult<()> {
        self.staged.insert(staged.id, staged);
        Ok(())
    }

    fn update_staged(&self, staged: ImportStagedAssignment) -> CoreResult<()> {
        if !self.staged.contains_key(&staged.id) {
            return Err(CoreError::NotFound(format!("staged assignment {}", staged.id)));
        }
        self.staged.insert(staged.id, staged);
        Ok(())
    }

    fn staged_for_batch(&self, batch_id: Uuid) -> Vec<ImportStagedAssignment> {
        let mut rows: Vec<ImportStagedAssignment> = self
            .staged
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|r| r.row_number);
        rows
    }

    fn delete_staged_for_batch(&self, batch_id: Uuid) -> usize {
        let ids: Vec<Uuid> = self
            .staged
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .map(|e| e.id)
            .collect();
        for id in &ids {
            self.staged.remove(id);
        }
        ids.len()
    }

    fn insert_webhook_endpoint(&self, endpoint: WebhookEndpoint) -> CoreResult<()> {
        self.webhooks.insert(endpoint.id, endpoint);
        Ok(())
    }

    fn webhook_endpoint(&self, id: Uuid) -> Option<WebhookEndpoint> {
        self.webhooks.get(&id).map(|e| e.value().clone())
    }

    fn update_webhook_endpoint(&self, endpoint: WebhookEndpoint) -> CoreResult<()> {
        if !self.webhooks.contains_key(&endpoint.id) {
            return Err(CoreError::NotFound(format!("webhook {}", endpoint.id)));
        }
        self.webhooks.insert(endpoint.id, endpoint);
        Ok(())
    }

    fn webhook_delivery(&self, delivery_id: &str) -> Option<WebhookDelivery> {
        self.deliveries.get(delivery_id).map(|e| e.value().clone())
    }

    fn record_webhook_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()> {
        match self.deliveries.entry(delivery.delivery_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                occupied.get_mut().attempt_count += 1;
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(delivery);
            }
        }
        Ok(())
    }

    fn insert_subscription(&self, subscription: CalendarSubscription) -> CoreResult<()> {
        self.subscriptions
            .insert(subscription.token.clone(), subscription);
        Ok(())
    }

    fn subscription_by_token(&self, token: &str) -> Option<CalendarSubscription> {
        self.subscriptions.get(token).map(|e| e.value().clone())
    }

    fn update_subscription(&self, subscription: CalendarSubscription) -> CoreResult<()> {
        if !self.subscriptions.contains_key(&subscription.token) {
            return Err(CoreError::NotFound("calendar subscription".into()));
        }
        self.subscriptions
            .insert(subscription.token.clone(), subscription);
        Ok(())
    }

    fn transaction_id(&self) -> u64 {
        self.txn_id.load(Ordering::SeqCst)
    }

    fn transaction(&self, f: &mut dyn FnMut() -> CoreResult<()>) -> CoreResult<()> {
        let _guard = self.txn_guard.lock();
        let mut attempt = 0;
        loop {
            let snapshot = self.snapshot();
            match f() {
                Ok(()) => {
                    self.txn_id.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(err) => {
                    self.restore(snapshot);
                    attempt += 1;
                    if err.is_transient() && attempt < TRANSACTION_MAX_RETRIES {
                        warn!(attempt, error = %err, "transient transaction failure, retrying");
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}
