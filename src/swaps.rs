//! Swap execution
//!
//! Exchanges two people's block assignments inside a transactional scope.
//! Both rows are removed and re-inserted so the (block, person) uniqueness
//! constraint holds at every commit point.

use crate::domain::{SwapRecord, SwapStatus};
use crate::error::{CoreError, CoreResult};
use crate::store::Datastore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Outcome of executing a swap
#[derive(Debug, Clone)]
pub struct SwapExecution {
    pub swap_id: Uuid,
    pub first_assignment_id: Uuid,
    pub second_assignment_id: Uuid,
}

/// Executes approved swaps against the assignment table
pub struct SwapService {
    store: Arc<dyn Datastore>,
}

impl SwapService {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Swap the people on two assignments and mark the record executed
    pub fn execute(
        &self,
        swap: &mut SwapRecord,
        first_assignment_id: Uuid,
        second_assignment_id: Uuid,
    ) -> CoreResult<SwapExecution> {
        if swap.status != SwapStatus::Approved {
            return Err(CoreError::Conflict(format!(
                "cannot execute swap with status: {}",
                swap.status.as_str()
            )));
        }

        let store = &self.store;
        store.transaction(&mut || {
            let first = store
                .assignment(first_assignment_id)
                .ok_or_else(|| CoreError::NotFound(format!("assignment {}", first_assignment_id)))?;
            let second = store
                .assignment(second_assignment_id)
                .ok_or_else(|| CoreError::NotFound(format!("assignment {}", second_assignment_id)))?;

            store.delete_assignment(first.id)?;
            store.delete_assignment(second.id)?;

            let mut swapped_first = first.clone();
            swapped_first.person_id = second.person_id;
            let mut swapped_second = second.clone();
            swapped_second.person_id = first.person_id;

            store.insert_assignment(swapped_first)?;
            store.insert_assignment(swapped_second)?;
            Ok(())
        })?;

        swap.status = SwapStatus::Executed;
        swap.executed_at = Some(Utc::now());
        self.store.insert_swap(swap.clone())?;

        info!(swap_id = %swap.id, "executed swap");
        Ok(SwapExecution {
            swap_id: swap.id,
            first_assignment_id,
            second_assignment_id,
        })
    }
}
