//! Payment webhook signature verification and event parsing.
//!
//! The signature header is the sole authentication mechanism for inbound
//! payment events: `t=<unix seconds>,v1=<hex hmac>`, where the MAC is
//! HMAC-SHA256 over `"{t}.{raw body}"` keyed on the endpoint's signing
//! secret. Requests failing verification are rejected before any state is
//! read or written.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use coralbay_core::{PaymentIntentId, SubscriptionId};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age of a signed payload, in seconds. Bounds replay of
/// captured deliveries.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// The event type that drives the subscription renewal reactor.
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";

/// Webhook verification / parsing failures.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature header missing")]
    MissingSignature,

    #[error("webhook signature header malformed")]
    MalformedSignature,

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("webhook timestamp outside tolerance")]
    StaleTimestamp,

    #[error("webhook payload malformed: {0}")]
    MalformedPayload(String),
}

/// A verified webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: String,
    /// The event's `data.object` payload.
    pub object: Value,
}

impl WebhookEvent {
    /// The subscription id carried on an invoice event.
    #[must_use]
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.object
            .get("subscription")
            .and_then(Value::as_str)
            .map(SubscriptionId::new)
    }

    /// The payment intent id carried on an invoice event.
    #[must_use]
    pub fn payment_intent_id(&self) -> Option<PaymentIntentId> {
        self.object
            .get("payment_intent")
            .and_then(Value::as_str)
            .map(PaymentIntentId::new)
    }
}

/// Verify a signature header against the raw request body, then parse the
/// event.
///
/// # Errors
///
/// Returns `WebhookError` if the header is absent, malformed, stale, or
/// does not match, or if the verified payload is not a well-formed event.
pub fn verify_and_parse(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &SecretString,
) -> Result<WebhookEvent, WebhookError> {
    verify_and_parse_at(
        payload,
        signature_header,
        secret,
        chrono::Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    )
}

/// Verification against an explicit clock, for tests and replay tooling.
///
/// # Errors
///
/// Same conditions as [`verify_and_parse`].
pub fn verify_and_parse_at(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &SecretString,
    now: i64,
    tolerance_secs: i64,
) -> Result<WebhookEvent, WebhookError> {
    let header = signature_header.ok_or(WebhookError::MissingSignature)?;
    let (timestamp, signature) = parse_signature_header(header)?;

    if (now - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| WebhookError::SignatureInvalid)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&signature)
        .map_err(|_| WebhookError::SignatureInvalid)?;

    parse_event(payload)
}

/// Compute the signature header for a payload, used by tests and the
/// local replay tooling to produce deliveries the verifier accepts.
#[must_use]
pub fn sign(payload: &[u8], secret: &SecretString, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = encode_hex(&mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<u8>), WebhookError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = decode_hex(value),
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok((timestamp, signature)),
        _ => Err(WebhookError::MalformedSignature),
    }
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| WebhookError::MalformedPayload("missing event type".to_owned()))?
        .to_owned();
    let object = value
        .pointer("/data/object")
        .cloned()
        .ok_or_else(|| WebhookError::MalformedPayload("missing data.object".to_owned()))?;

    Ok(WebhookEvent { event_type, object })
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
