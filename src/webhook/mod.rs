//! Inbound webhook verification
//!
//! A fixed pipeline per request, short-circuiting on the first failure: IP
//! whitelist, required headers, payload parse and size cap, secret lookup,
//! signature extraction, timestamp freshness, HMAC verification, and replay
//! detection. Failure reasons stay high-level toward the caller; the detail
//! lands in the log.

pub mod verifier;

pub use verifier::{
    sign_payload, RotationMetadata, SignatureAlgorithm, VerificationRequest, VerificationResult,
    VerifyOptions, WebhookVerifier,
};
