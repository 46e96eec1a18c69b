//! Inbound webhook payload schema.
//!
//! The processor reports payment state changes as flat JSON bodies. The
//! event kind is parsed into a closed set of variants with an explicit
//! fallback for kinds this service does not handle, so new processor events
//! degrade to "logged and dropped" instead of breaking the endpoint.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Event kinds carried in the webhook `event` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    PaymentCompleted,
    PaymentFailed,
    PaymentPending,
    PaymentExpired,
    /// Any event kind this service does not handle, kept verbatim for logging.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PaymentCompleted => "payment.completed",
            EventKind::PaymentFailed => "payment.failed",
            EventKind::PaymentPending => "payment.pending",
            EventKind::PaymentExpired => "payment.expired",
            EventKind::Other(event) => event,
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "payment.completed" => EventKind::PaymentCompleted,
            "payment.failed" => EventKind::PaymentFailed,
            "payment.pending" => EventKind::PaymentPending,
            "payment.expired" => EventKind::PaymentExpired,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.as_str().into())
    }
}

/// Raw inbound webhook payload. Transient — lives for one request only and
/// is never persisted.
///
/// `amount` is in sats (the smallest settlement unit). `failure_reason` is
/// only populated on `payment.failed`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: EventKind,
    pub payment_id: String,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Parse a verified webhook body. This is the validation boundary: every
/// field access downstream goes through the typed envelope.
pub fn parse_envelope(raw: &[u8]) -> Result<WebhookEnvelope, serde_json::Error> {
    serde_json::from_slice(raw)
}
