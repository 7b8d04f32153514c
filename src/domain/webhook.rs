//! Webhook endpoint configuration and delivery records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured inbound webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub name: String,
    pub secret: String,
    /// Previous secret still honored until this instant, if rotating
    pub old_secret: Option<String>,
    pub old_secret_valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl WebhookEndpoint {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            secret: secret.into(),
            old_secret: None,
            old_secret_valid_until: None,
            is_active: true,
        }
    }
}

/// A delivery we have already seen, keyed by the sender's delivery id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub webhook_id: Option<Uuid>,
    pub first_attempted_at: DateTime<Utc>,
    pub attempt_count: u32,
}

impl WebhookDelivery {
    pub fn new(delivery_id: impl Into<String>) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            webhook_id: None,
            first_attempted_at: Utc::now(),
            attempt_count: 1,
        }
    }
}
