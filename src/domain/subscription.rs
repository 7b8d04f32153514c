//! Calendar subscription tokens

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A token-authenticated calendar feed subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSubscription {
    /// URL-safe random token; the sole auth credential for the feed
    pub token: String,
    pub person_id: Uuid,
    pub created_by_user_id: Option<Uuid>,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl CalendarSubscription {
    pub fn new(person_id: Uuid, label: impl Into<String>) -> Self {
        Self {
            token: generate_token(),
            person_id,
            created_by_user_id: None,
            label: label.into(),
            is_active: true,
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            last_accessed_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the token still authorizes feed access at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires) => now <= expires,
            None => true,
        }
    }

    /// Revoke the token
    pub fn revoke(&mut self) {
        self.is_active = false;
        self.revoked_at = Some(Utc::now());
    }
}

/// Generate a URL-safe token from 32 random bytes
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_is_url_safe() {
        let token = generate_token();
        assert!(token.len() >= 32);
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut sub = CalendarSubscription::new(Uuid::new_v4(), "phone")
            .with_expiry(now + Duration::hours(1));
        assert!(sub.is_valid_at(now));
        assert!(!sub.is_valid_at(now + Duration::hours(2)));
        sub.revoke();
        assert!(!sub.is_valid_at(now));
    }
}
