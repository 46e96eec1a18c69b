use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::LazyLock;

pub static WEBHOOK_DELIVERIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lightmarket_webhook_deliveries_total",
        "Inbound processor webhook deliveries",
        &["result"]
    )
    .unwrap()
});

pub static ROUTED_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lightmarket_routed_events_total",
        "Verified webhook events by routing outcome",
        &["kind"]
    )
    .unwrap()
});

pub static REALTIME_PUBLISHES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lightmarket_realtime_publish_total",
        "Realtime relay publish attempts",
        &["result"]
    )
    .unwrap()
});

pub static STATUS_POLLS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lightmarket_status_polls_total",
        "Fallback mailbox polls",
        &["result"]
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
