//! Swap records: exchanges of assignments between two people

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Swap lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Requested,
    Approved,
    Executed,
    Declined,
    Cancelled,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Requested => "requested",
            SwapStatus::Approved => "approved",
            SwapStatus::Executed => "executed",
            SwapStatus::Declined => "declined",
            SwapStatus::Cancelled => "cancelled",
        }
    }
}

/// A requested or executed assignment swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub id: Uuid,
    pub status: SwapStatus,
    pub swap_type: String,
    pub requester_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl SwapRecord {
    pub fn new(requester_id: Uuid, swap_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SwapStatus::Requested,
            swap_type: swap_type.into(),
            requester_id,
            counterparty_id: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }
}
