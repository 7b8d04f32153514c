//! Webhook verification scenarios and properties

use chrono::Utc;
use medshift::config::WebhookConfig;
use medshift::store::MemoryStore;
use medshift::webhook::verifier::{sign_payload, VerifyOptions};
use medshift::webhook::{SignatureAlgorithm, VerificationRequest, WebhookVerifier};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(Arc::new(MemoryStore::new()), WebhookConfig::default())
}

fn options(secret: &str) -> VerifyOptions {
    VerifyOptions {
        secret: Some(secret.to_string()),
        ..VerifyOptions::default()
    }
}

/// The same delivery id within the tolerance window verifies twice; the
/// first is fresh, the second is flagged as a retry but still valid.
#[test]
fn replay_is_flagged_not_rejected() {
    let verifier = verifier();
    let payload = json!({"event": "swap.requested", "swap_id": "abc"});
    let timestamp = Utc::now().timestamp();
    let signature = sign_payload(&payload, timestamp, "secret", SignatureAlgorithm::Sha256);

    let request = VerificationRequest::new(serde_json::to_vec(&payload).unwrap())
        .header("X-Webhook-Signature", format!("sha256={}", signature))
        .header("X-Webhook-Timestamp", timestamp.to_string())
        .header("X-Webhook-Delivery", "delivery-42");

    let first = verifier.verify(&request, &options("secret"));
    assert!(first.valid);
    assert!(!first.is_retry());

    let second = verifier.verify(&request, &options("secret"));
    assert!(second.valid);
    assert!(second.is_retry());
}

/// The alternate GitHub-style signature header is accepted.
#[test]
fn hub_signature_header_accepted() {
    let verifier = verifier();
    let payload = json!({"ref": "main"});
    let timestamp = Utc::now().timestamp();
    let signature = sign_payload(&payload, timestamp, "secret", SignatureAlgorithm::Sha256);

    let request = VerificationRequest::new(serde_json::to_vec(&payload).unwrap())
        .header("X-Hub-Signature-256", signature)
        .header("x-webhook-timestamp", timestamp.to_string());
    assert!(verifier.verify(&request, &options("secret")).valid);
}

/// A timestamp outside the tolerance fails even with a valid signature.
#[test]
fn stale_and_future_timestamps_rejected() {
    let verifier = verifier();
    let payload = json!({"event": "x"});
    for offset in [-301i64, 301] {
        let timestamp = Utc::now().timestamp() + offset;
        let signature = sign_payload(&payload, timestamp, "secret", SignatureAlgorithm::Sha256);
        let request = VerificationRequest::new(serde_json::to_vec(&payload).unwrap())
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Timestamp", timestamp.to_string());
        assert!(!verifier.verify(&request, &options("secret")).valid);
    }
}

/// A tampered payload no longer matches the signature.
#[test]
fn tampered_payload_rejected() {
    let verifier = verifier();
    let payload = json!({"amount": 100});
    let timestamp = Utc::now().timestamp();
    let signature = sign_payload(&payload, timestamp, "secret", SignatureAlgorithm::Sha256);

    let tampered = json!({"amount": 1000});
    let request = VerificationRequest::new(serde_json::to_vec(&tampered).unwrap())
        .header("X-Webhook-Signature", signature)
        .header("X-Webhook-Timestamp", timestamp.to_string());
    let result = verifier.verify(&request, &options("secret"));
    assert!(!result.valid);
    assert_eq!(result.failure_reason.as_deref(), Some("Signature mismatch"));
}

/// SHA-512 and SHA-1 verify under their own algorithms.
#[test]
fn alternate_algorithms() {
    let verifier = verifier();
    let payload = json!({"event": "x"});
    for algorithm in [SignatureAlgorithm::Sha512, SignatureAlgorithm::Sha1] {
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(&payload, timestamp, "secret", algorithm);
        let request = VerificationRequest::new(serde_json::to_vec(&payload).unwrap())
            .header(
                "X-Webhook-Signature",
                format!("{}={}", algorithm.as_str(), signature),
            )
            .header("X-Webhook-Timestamp", timestamp.to_string());
        let opts = VerifyOptions {
            secret: Some("secret".to_string()),
            algorithm: Some(algorithm),
            ..VerifyOptions::default()
        };
        assert!(verifier.verify(&request, &opts).valid);
    }
}

proptest! {
    /// Signature determinism: verify(sign(payload, ts, secret)) holds for
    /// arbitrary payload content and secrets.
    #[test]
    fn sign_verify_roundtrip(
        event in "[a-z._-]{1,24}",
        count in 0u32..10_000,
        secret in "[ -~]{1,48}",
    ) {
        let verifier = WebhookVerifier::new(
            Arc::new(MemoryStore::new()),
            WebhookConfig::default(),
        );
        let payload = json!({"event": event, "count": count, "nested": {"z": 1, "a": 2}});
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(&payload, timestamp, &secret, SignatureAlgorithm::Sha256);

        let request = VerificationRequest::new(serde_json::to_vec(&payload).unwrap())
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Timestamp", timestamp.to_string());
        let opts = VerifyOptions {
            secret: Some(secret.clone()),
            ..VerifyOptions::default()
        };
        prop_assert!(verifier.verify(&request, &opts).valid);
    }
}
