//! HMAC webhook verification with replay protection

use crate::config::WebhookConfig;
use crate::domain::{WebhookDelivery, WebhookEndpoint};
use crate::store::Datastore;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Supported HMAC algorithms; SHA-1 is legacy support only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha256,
    Sha512,
    Sha1,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256 => "sha256",
            SignatureAlgorithm::Sha512 => "sha512",
            SignatureAlgorithm::Sha1 => "sha1",
        }
    }
}

/// An inbound request reduced to what verification needs
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub client_ip: Option<IpAddr>,
}

impl VerificationRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
            client_ip: None,
        }
    }

    /// Add a header; names compare case-insensitively
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Outcome of a verification pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    /// High-level reason only; specifics go to the log
    pub failure_reason: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            failure_reason: None,
            metadata: HashMap::new(),
            verified_at: Utc::now(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            failure_reason: Some(reason.into()),
            metadata: HashMap::new(),
            verified_at: Utc::now(),
        }
    }

    fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether replay detection flagged a duplicate delivery
    pub fn is_retry(&self) -> bool {
        self.metadata
            .get("is_retry")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Metadata returned by a secret rotation
#[derive(Debug, Clone, Serialize)]
pub struct RotationMetadata {
    pub rotated_at: DateTime<Utc>,
    /// First 16 hex chars of the old secret's SHA-256, for audit trails
    pub old_secret_hash: String,
    pub verify_with_both: bool,
    pub old_secret_valid_until: Option<DateTime<Utc>>,
    pub grace_period_hours: Option<i64>,
}

/// Per-request verification options
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub webhook_id: Option<Uuid>,
    pub secret: Option<String>,
    pub algorithm: Option<SignatureAlgorithm>,
    pub ip_whitelist: Vec<String>,
    pub required_headers: Vec<String>,
}

/// The verification pipeline
pub struct WebhookVerifier {
    store: Arc<dyn Datastore>,
    config: WebhookConfig,
}

impl WebhookVerifier {
    pub fn new(store: Arc<dyn Datastore>, config: WebhookConfig) -> Self {
        Self { store, config }
    }

    /// Run the pipeline, short-circuiting on the first failing check
    pub fn verify(&self, request: &VerificationRequest, options: &VerifyOptions) -> VerificationResult {
        let algorithm = options.algorithm.unwrap_or(SignatureAlgorithm::Sha256);

        // IP whitelist
        if self.config.enable_ip_whitelist && !options.ip_whitelist.is_empty() {
            let result = self.verify_ip(request, &options.ip_whitelist);
            if !result.valid {
                warn!(reason = ?result.failure_reason, "webhook IP verification failed");
                return result;
            }
        }

        // Required headers
        if !options.required_headers.is_empty() {
            let missing: Vec<&str> = options
                .required_headers
                .iter()
                .map(String::as_str)
                .filter(|name| request.get_header(name).is_none())
                .collect();
            if !missing.is_empty() {
                warn!(?missing, "webhook missing required headers");
                return VerificationResult::fail("Missing required headers");
            }
        }

        // Size cap before parsing
        if request.body.len() > self.config.max_payload_bytes {
            warn!(
                size = request.body.len(),
                max = self.config.max_payload_bytes,
                "webhook payload too large"
            );
            return VerificationResult::fail("Payload too large")
                .with_meta("payload_too_large", true);
        }

        // Payload parse
        let payload: Value = if request.body.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_slice(&request.body) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "webhook payload JSON decode error");
                    return VerificationResult::fail("Invalid JSON payload");
                }
            }
        };

        // Secret lookup
        let endpoint = options
            .webhook_id
            .and_then(|id| self.store.webhook_endpoint(id));
        let secret = match (&options.secret, &endpoint) {
            (Some(secret), _) => secret.clone(),
            (None, Some(endpoint)) => endpoint.secret.clone(),
            (None, None) => {
                warn!("no secret available for webhook verification");
                return VerificationResult::fail("Verification unavailable");
            }
        };

        // Signature and timestamp headers
        let Some(signature) = request
            .get_header("X-Webhook-Signature")
            .or_else(|| request.get_header("X-Hub-Signature-256"))
        else {
            warn!("webhook request missing signature header");
            return VerificationResult::fail("Missing signature header");
        };
        let Some(timestamp_raw) = request.get_header("X-Webhook-Timestamp") else {
            warn!("webhook request missing timestamp header");
            return VerificationResult::fail("Missing timestamp header");
        };
        let Ok(timestamp) = timestamp_raw.parse::<i64>() else {
            warn!(timestamp = timestamp_raw, "invalid webhook timestamp format");
            return VerificationResult::fail("Invalid timestamp");
        };

        // Freshness window against replay
        let now = Utc::now().timestamp();
        let age = (now - timestamp).abs();
        if age > self.config.timestamp_tolerance_secs {
            warn!(
                age_secs = age,
                tolerance = self.config.timestamp_tolerance_secs,
                "webhook timestamp outside tolerance"
            );
            return VerificationResult::fail("Timestamp outside tolerance");
        }

        // Optional algo= prefix must agree with the configured algorithm
        let signature_value = match signature.split_once('=') {
            Some((prefix, value)) => {
                if prefix != algorithm.as_str() {
                    warn!(
                        expected = algorithm.as_str(),
                        got = prefix,
                        "webhook signature algorithm mismatch"
                    );
                    return VerificationResult::fail("Signature mismatch");
                }
                value
            }
            None => signature,
        };

        // Constant-time signature check, honoring a rotating old secret
        // within its grace window
        let mut secrets = vec![secret];
        if let Some(endpoint) = &endpoint {
            if let (Some(old_secret), Some(valid_until)) =
                (&endpoint.old_secret, endpoint.old_secret_valid_until)
            {
                if Utc::now() <= valid_until {
                    secrets.push(old_secret.clone());
                }
            }
        }
        let verified = secrets.iter().any(|candidate| {
            let expected = sign_payload(&payload, timestamp, candidate, algorithm);
            constant_time_eq(signature_value, &expected)
        });
        if !verified {
            warn!("webhook signature mismatch");
            return VerificationResult::fail("Signature mismatch");
        }

        let mut result = VerificationResult::ok()
            .with_meta("timestamp", timestamp)
            .with_meta("algorithm", algorithm.as_str())
            .with_meta("payload_size", request.body.len() as u64);

        // Replay detection: a duplicate delivery id still verifies, but the
        // handler decides what to do with the flag
        if self.config.enable_retry_detection {
            if let Some(delivery_id) = request.get_header("X-Webhook-Delivery") {
                if let Some(prior) = self.store.webhook_delivery(delivery_id) {
                    info!(delivery_id, "duplicate webhook delivery detected");
                    result = result
                        .with_meta("is_retry", true)
                        .with_meta("first_attempted_at", prior.first_attempted_at.to_rfc3339())
                        .with_meta("attempt_count", prior.attempt_count + 1);
                }
                let mut delivery = WebhookDelivery::new(delivery_id);
                delivery.webhook_id = options.webhook_id;
                if let Err(err) = self.store.record_webhook_delivery(delivery) {
                    warn!(error = %err, "failed to record webhook delivery");
                }
            }
        }

        debug!(payload_size = request.body.len(), "webhook verification successful");
        result
    }

    /// Whitelist check; entries may be single IPs or CIDR ranges
    fn verify_ip(&self, request: &VerificationRequest, whitelist: &[String]) -> VerificationResult {
        let Some(client_ip) = request.client_ip else {
            return VerificationResult::fail("Unable to determine client IP address");
        };

        for allowed in whitelist {
            if let Some((base, prefix)) = allowed.split_once('/') {
                let (Ok(base_ip), Ok(prefix_len)) = (base.parse::<IpAddr>(), prefix.parse::<u8>())
                else {
                    warn!(entry = allowed.as_str(), "invalid whitelist entry");
                    continue;
                };
                if cidr_contains(base_ip, prefix_len, client_ip) {
                    return VerificationResult::ok().with_meta("matched_network", allowed.clone());
                }
            } else {
                match allowed.parse::<IpAddr>() {
                    Ok(allowed_ip) if allowed_ip == client_ip => {
                        return VerificationResult::ok().with_meta("matched_ip", allowed.clone());
                    }
                    Ok(_) => {}
                    Err(_) => warn!(entry = allowed.as_str(), "invalid whitelist entry"),
                }
            }
        }

        VerificationResult::fail("IP address not in whitelist")
    }

    /// Generate a URL-safe secret
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Rotate a secret, returning the replacement and grace-window metadata
    pub fn rotate_secret(
        old_secret: &str,
        verify_with_both: bool,
        grace_period_hours: i64,
    ) -> (String, RotationMetadata) {
        let new_secret = Self::generate_secret();
        let old_secret_hash = hex::encode(Sha256::digest(old_secret.as_bytes()))[..16].to_string();
        let metadata = RotationMetadata {
            rotated_at: Utc::now(),
            old_secret_hash,
            verify_with_both,
            old_secret_valid_until: verify_with_both
                .then(|| Utc::now() + Duration::hours(grace_period_hours)),
            grace_period_hours: verify_with_both.then_some(grace_period_hours),
        };
        (new_secret, metadata)
    }

    /// Apply a rotation to a stored endpoint
    pub fn rotate_endpoint_secret(
        &self,
        webhook_id: Uuid,
        grace_period_hours: i64,
    ) -> crate::error::CoreResult<(String, RotationMetadata)> {
        let mut endpoint: WebhookEndpoint = self
            .store
            .webhook_endpoint(webhook_id)
            .ok_or_else(|| crate::error::CoreError::NotFound(format!("webhook {}", webhook_id)))?;
        let (new_secret, metadata) = Self::rotate_secret(&endpoint.secret, true, grace_period_hours);
        endpoint.old_secret = Some(endpoint.secret.clone());
        endpoint.old_secret_valid_until = metadata.old_secret_valid_until;
        endpoint.secret = new_secret.clone();
        self.store.update_webhook_endpoint(endpoint)?;
        Ok((new_secret, metadata))
    }
}

/// Hex HMAC over `"{timestamp}.{canonical_json}"`. serde_json renders object
/// keys sorted with compact separators, which is the canonical form both
/// sides sign.
pub fn sign_payload(
    payload: &Value,
    timestamp: i64,
    secret: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    let signing_string = format!("{}.{}", timestamp, canonical);
    // HMAC accepts keys of any length, so construction cannot fail
    match algorithm {
        SignatureAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any key length");
            mac.update(signing_string.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any key length");
            mac.update(signing_string.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any key length");
            mac.update(signing_string.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn cidr_contains(base: IpAddr, prefix_len: u8, candidate: IpAddr) -> bool {
    fn to_bits(ip: IpAddr) -> Option<(u128, u32)> {
        match ip {
            IpAddr::V4(v4) => Some((u32::from(v4) as u128, 32)),
            IpAddr::V6(v6) => Some((u128::from(v6), 128)),
        }
    }
    let (Some((base_bits, base_width)), Some((candidate_bits, candidate_width))) =
        (to_bits(base), to_bits(candidate))
    else {
        return false;
    };
    if base_width != candidate_width || prefix_len as u32 > base_width {
        return false;
    }
    if prefix_len == 0 {
        return true;
    }
    let shift = base_width - prefix_len as u32;
    (base_bits >> shift) == (candidate_bits >> shift)
}
