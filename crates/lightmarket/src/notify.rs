//! Event routing: classify a verified webhook and derive the outbound
//! notification, its channel and the subscriber-side event name.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::webhook::{EventKind, WebhookEnvelope};

/// Canonical payment status carried on every outbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Failed,
    Expired,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Pending => "pending",
        }
    }
}

/// Outward-facing payment event, published to the realtime channel and
/// parked in the fallback mailbox. `timestamp` is epoch millis at the moment
/// the notification was derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub payment_id: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64,
}

/// Channel a payment's browser session subscribes to.
pub fn channel_name(payment_id: &str) -> String {
    format!("payment-{payment_id}")
}

/// Event name expected by the browser subscriber. Fixed external contract —
/// the storefront client listens for these exact names.
pub fn realtime_event_name(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Completed => "payment-success",
        PaymentStatus::Failed => "payment-failed",
        PaymentStatus::Expired => "payment-expired",
        PaymentStatus::Pending => "payment-update",
    }
}

/// Routing decision for one verified webhook delivery.
#[derive(Debug, Clone)]
pub enum Routing {
    /// Publish to the channel and park in the fallback mailbox.
    Deliver {
        channel: String,
        event_name: &'static str,
        payload: NotificationPayload,
    },
    /// Invoice created but not yet paid — no actionable change for a
    /// waiting subscriber, so nothing is published or parked.
    Pending { payment_id: String },
    /// Event kind this service does not handle. Logged and dropped; the
    /// webhook is still acknowledged.
    Unrecognized { event: String, payment_id: String },
}

/// Classify a verified envelope and derive the outbound notification.
/// The payload always carries the same payment id that addresses its
/// channel and mailbox slot.
pub fn route(envelope: WebhookEnvelope) -> Routing {
    let status = match envelope.event {
        EventKind::PaymentCompleted => PaymentStatus::Completed,
        EventKind::PaymentFailed => PaymentStatus::Failed,
        EventKind::PaymentExpired => PaymentStatus::Expired,
        EventKind::PaymentPending => {
            return Routing::Pending {
                payment_id: envelope.payment_id,
            }
        }
        EventKind::Other(event) => {
            return Routing::Unrecognized {
                event,
                payment_id: envelope.payment_id,
            }
        }
    };

    let channel = channel_name(&envelope.payment_id);
    let payload = NotificationPayload {
        payment_id: envelope.payment_id,
        status,
        amount: envelope.amount,
        description: envelope.description,
        metadata: envelope.metadata,
        reason: envelope.failure_reason,
        timestamp: Utc::now().timestamp_millis(),
    };

    Routing::Deliver {
        channel,
        event_name: realtime_event_name(status),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event: &str) -> WebhookEnvelope {
        WebhookEnvelope {
            event: event.into(),
            payment_id: "pay_1".to_string(),
            amount: Some(1000),
            description: Some("Lightning Icon Pack".to_string()),
            metadata: None,
            failure_reason: None,
        }
    }

    #[test]
    fn completed_routes_to_delivery() {
        match route(envelope("payment.completed")) {
            Routing::Deliver {
                channel,
                event_name,
                payload,
            } => {
                assert_eq!(channel, "payment-pay_1");
                assert_eq!(event_name, "payment-success");
                assert_eq!(payload.status, PaymentStatus::Completed);
                assert_eq!(payload.payment_id, "pay_1");
                assert_eq!(payload.amount, Some(1000));
                assert!(payload.timestamp > 0);
            }
            other => panic!("expected Deliver, got {other:?}"),
        }
    }

    #[test]
    fn failed_carries_reason() {
        let mut env = envelope("payment.failed");
        env.failure_reason = Some("insufficient liquidity".to_string());
        match route(env) {
            Routing::Deliver {
                event_name,
                payload,
                ..
            } => {
                assert_eq!(event_name, "payment-failed");
                assert_eq!(payload.status, PaymentStatus::Failed);
                assert_eq!(payload.reason.as_deref(), Some("insufficient liquidity"));
            }
            other => panic!("expected Deliver, got {other:?}"),
        }
    }

    #[test]
    fn expired_maps_to_expired_event_name() {
        match route(envelope("payment.expired")) {
            Routing::Deliver {
                event_name,
                payload,
                ..
            } => {
                assert_eq!(event_name, "payment-expired");
                assert_eq!(payload.status, PaymentStatus::Expired);
            }
            other => panic!("expected Deliver, got {other:?}"),
        }
    }

    #[test]
    fn pending_is_not_delivered() {
        match route(envelope("payment.pending")) {
            Routing::Pending { payment_id } => assert_eq!(payment_id, "pay_1"),
            other => panic!("expected Pending, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_event_is_dropped() {
        match route(envelope("payment.refunded")) {
            Routing::Unrecognized { event, payment_id } => {
                assert_eq!(event, "payment.refunded");
                assert_eq!(payment_id, "pay_1");
            }
            other => panic!("expected Unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn payload_serializes_camel_case_without_empty_fields() {
        let payload = NotificationPayload {
            payment_id: "pay_9".to_string(),
            status: PaymentStatus::Completed,
            amount: Some(500),
            description: None,
            metadata: None,
            reason: None,
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["paymentId"], "pay_9");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["amount"], 500);
        assert!(value.get("reason").is_none());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn pending_status_maps_to_generic_update_name() {
        assert_eq!(realtime_event_name(PaymentStatus::Pending), "payment-update");
    }
}
