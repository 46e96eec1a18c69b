use std::sync::Arc;
use std::time::Duration;

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_stream::wrappers::IntervalStream;

use lightmarket::invoice;
use lightmarket::mailbox::schedule_expiry;
use lightmarket::nakapay::CreatePaymentRequest;
use lightmarket::notify::Routing;
use lightmarket::{channel_name, parse_envelope, route};

use crate::metrics;
use crate::state::AppState;

/// Header carrying the processor's hex HMAC-SHA256 over the raw body.
const SIGNATURE_HEADER: &str = "X-Nakapay-Signature";

/// Heartbeat cadence on the payment event stream.
const STREAM_HEARTBEAT: Duration = Duration::from_secs(25);

/// Heartbeats sent before the stream hits its five-minute ceiling.
const STREAM_HEARTBEAT_COUNT: usize = 11;

/// Inbound processor webhook. Single pass, no retries:
/// no secret → 500, bad signature → 401 (no side effects), unparsable body
/// → 500, everything after a verified parse → 200, with routing failures
/// swallowed and logged so the processor never re-delivers a webhook we
/// already accepted.
#[post("/webhooks/nakapay")]
pub async fn nakapay_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let Some(secret) = state.webhook_secret.as_deref() else {
        tracing::error!("NAKAPAY_WEBHOOK_SECRET not configured");
        metrics::WEBHOOK_DELIVERIES
            .with_label_values(&["unconfigured"])
            .inc();
        return HttpResponse::InternalServerError().body("Webhook secret not configured");
    };

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // Verification runs over the raw body bytes exactly as received;
    // hashing a re-serialized parse would produce different bytes.
    if !lightmarket::hmac::verify_signature(secret, &body, signature) {
        tracing::warn!("invalid webhook signature");
        metrics::WEBHOOK_DELIVERIES
            .with_label_values(&["unauthorized"])
            .inc();
        return HttpResponse::Unauthorized().body("Invalid signature");
    }

    let envelope = match parse_envelope(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "webhook body parse failed");
            metrics::WEBHOOK_DELIVERIES
                .with_label_values(&["parse_error"])
                .inc();
            return HttpResponse::InternalServerError().body("Webhook processing failed");
        }
    };

    metrics::WEBHOOK_DELIVERIES
        .with_label_values(&["accepted"])
        .inc();

    match route(envelope) {
        Routing::Deliver {
            channel,
            event_name,
            payload,
        } => {
            metrics::ROUTED_EVENTS
                .with_label_values(&[payload.status.as_str()])
                .inc();
            tracing::info!(
                payment_id = %payload.payment_id,
                status = payload.status.as_str(),
                amount = payload.amount,
                "payment event received"
            );

            // Best-effort: a failed publish is logged and the webhook still
            // acknowledged — the mailbox/poll path covers delivery.
            match &state.realtime {
                Some(realtime) => match realtime.publish(&channel, event_name, &payload).await {
                    Ok(()) => {
                        metrics::REALTIME_PUBLISHES
                            .with_label_values(&["delivered"])
                            .inc();
                        tracing::debug!(channel = %channel, event = event_name, "published realtime notification");
                    }
                    Err(e) => {
                        metrics::REALTIME_PUBLISHES
                            .with_label_values(&["failed"])
                            .inc();
                        tracing::warn!(channel = %channel, error = %e, "realtime publish failed, poll fallback only");
                    }
                },
                None => {
                    metrics::REALTIME_PUBLISHES
                        .with_label_values(&["skipped"])
                        .inc();
                    tracing::debug!(channel = %channel, "realtime relay not configured, poll fallback only");
                }
            }

            let payment_id = payload.payment_id.clone();
            let generation = state.mailbox.put(&payment_id, payload);
            schedule_expiry(
                Arc::clone(&state.mailbox),
                payment_id,
                generation,
                state.mailbox_ttl,
            );
        }
        Routing::Pending { payment_id } => {
            metrics::ROUTED_EVENTS.with_label_values(&["pending"]).inc();
            tracing::info!(payment_id = %payment_id, "payment pending, nothing to deliver");
        }
        Routing::Unrecognized { event, payment_id } => {
            metrics::ROUTED_EVENTS
                .with_label_values(&["unrecognized"])
                .inc();
            tracing::info!(event = %event, payment_id = %payment_id, "unrecognized webhook event dropped");
        }
    }

    HttpResponse::Ok().body("OK")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIdQuery {
    pub payment_id: Option<String>,
}

/// Fallback status poll. Consumes the mailbox entry on read: the first poll
/// after an event returns it, every later poll reports no update.
#[get("/payments/status")]
pub async fn payment_status_poll(
    state: web::Data<AppState>,
    query: web::Query<PaymentIdQuery>,
) -> HttpResponse {
    let Some(payment_id) = query
        .payment_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
    else {
        return HttpResponse::BadRequest().json(json!({ "error": "Payment ID required" }));
    };

    match state.mailbox.take_once(payment_id) {
        Some(payload) => {
            metrics::STATUS_POLLS.with_label_values(&["hit"]).inc();
            let mut body = match serde_json::to_value(&payload) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            body.insert("hasUpdate".to_string(), Value::Bool(true));
            body.insert(
                "timestamp".to_string(),
                json!(Utc::now().timestamp_millis()),
            );
            HttpResponse::Ok().json(body)
        }
        None => {
            metrics::STATUS_POLLS.with_label_values(&["miss"]).inc();
            HttpResponse::Ok().json(json!({
                "hasUpdate": false,
                "paymentId": payment_id,
                "timestamp": Utc::now().timestamp_millis(),
            }))
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenBody {
    pub payment_id: Option<String>,
    pub client_id: Option<String>,
}

/// Issue a short-lived, subscribe-only relay token request. Scoped to the
/// payment's own channel when an id is supplied, otherwise to any payment
/// channel.
#[post("/realtime-token")]
pub async fn realtime_token(
    state: web::Data<AppState>,
    body: Option<web::Json<TokenBody>>,
) -> HttpResponse {
    let Some(realtime) = &state.realtime else {
        tracing::error!("ABLY_API_KEY not configured");
        return HttpResponse::InternalServerError()
            .json(json!({ "message": "Realtime relay not configured" }));
    };

    let params = body.map(web::Json::into_inner).unwrap_or_default();
    let capability_channel = match params.payment_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => channel_name(id),
        None => "payment-*".to_string(),
    };

    match realtime.create_token_request(&capability_channel, params.client_id.as_deref()) {
        Ok(token) => HttpResponse::Ok().json(token),
        Err(e) => {
            tracing::error!(error = %e, "token request generation failed");
            HttpResponse::InternalServerError().json(json!({ "message": "Token generation failed" }))
        }
    }
}

#[derive(Deserialize)]
pub struct CreatePaymentBody {
    pub amount: Option<u64>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Create a lightning invoice with the processor for a storefront purchase.
#[post("/payments")]
pub async fn create_payment(
    state: web::Data<AppState>,
    body: web::Json<CreatePaymentBody>,
) -> HttpResponse {
    let Some(nakapay) = &state.nakapay else {
        tracing::error!("NAKAPAY_API_KEY not configured");
        return HttpResponse::InternalServerError()
            .json(json!({ "message": "API key not configured" }));
    };

    let (Some(amount), Some(description)) = (
        body.amount.filter(|a| *a > 0),
        body.description.as_deref().filter(|d| !d.trim().is_empty()),
    ) else {
        return HttpResponse::BadRequest()
            .json(json!({ "message": "Amount and description are required" }));
    };

    let profile = match nakapay.business_profile().await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(error = %e, "business profile lookup failed");
            return HttpResponse::InternalServerError().json(json!({ "message": e.to_string() }));
        }
    };
    let Some(lightning_address) = profile.lightning_address.as_deref() else {
        return HttpResponse::InternalServerError().json(json!({
            "message": "No destination wallet configured for this business. \
                        Please set a Lightning address in your business profile."
        }));
    };

    let mut metadata = body.metadata.clone().unwrap_or_default();
    metadata.insert("source".to_string(), Value::String("lightmarket-demo".to_string()));

    let request = CreatePaymentRequest {
        amount,
        description: description.to_string(),
        destination_wallet: lightning_address.to_string(),
        metadata: Some(metadata),
    };

    match nakapay.create_payment_request(&request).await {
        Ok(payment) => {
            if let Some(bolt11) = payment.invoice.as_deref() {
                match invoice::validate_invoice(bolt11) {
                    Ok(details) => tracing::debug!(
                        payment_id = %payment.id,
                        network = details.network.as_str(),
                        length = details.length,
                        "invoice created"
                    ),
                    Err(e) => tracing::warn!(
                        payment_id = %payment.id,
                        error = %e,
                        "processor returned implausible invoice"
                    ),
                }
            }
            HttpResponse::Ok().json(payment)
        }
        Err(e) => {
            tracing::error!(error = %e, "payment creation failed");
            HttpResponse::InternalServerError().json(json!({ "message": e.to_string() }))
        }
    }
}

/// Direct payment status pass-through to the processor, for clients that
/// want the authoritative record rather than the notification mailbox.
#[get("/payments/{id}")]
pub async fn payment_detail(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    if id.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({ "message": "Payment ID is required" }));
    }

    let Some(nakapay) = &state.nakapay else {
        tracing::error!("NAKAPAY_API_KEY not configured");
        return HttpResponse::InternalServerError()
            .json(json!({ "message": "API key not configured" }));
    };

    match nakapay.get_payment_request(&id).await {
        Ok(payment) => HttpResponse::Ok().json(payment),
        Err(e) => {
            tracing::error!(payment_id = %id, error = %e, "payment status check failed");
            HttpResponse::InternalServerError()
                .json(json!({ "message": "Failed to get payment status" }))
        }
    }
}

fn sse_event(data: &Value) -> web::Bytes {
    web::Bytes::from(format!("data: {data}\n\n"))
}

/// Server-sent event stream a browser holds while waiting for its payment.
/// No payment data flows here — the realtime relay and the status poll carry
/// that — but the connection is kept alive with heartbeats and hard-closed
/// at five minutes so an abandoned tab cannot pin resources.
#[get("/payments/stream")]
pub async fn payment_stream(query: web::Query<PaymentIdQuery>) -> HttpResponse {
    let Some(payment_id) = query
        .payment_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .map(String::from)
    else {
        return HttpResponse::BadRequest().body("Payment ID required");
    };

    let connected = futures::stream::once({
        let payment_id = payment_id.clone();
        async move {
            sse_event(&json!({
                "type": "connected",
                "paymentId": payment_id,
                "message": "Connected to payment stream",
            }))
        }
    });

    let heartbeats = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + STREAM_HEARTBEAT,
        STREAM_HEARTBEAT,
    ))
    .map(move |_| {
        sse_event(&json!({
            "type": "heartbeat",
            "timestamp": Utc::now().timestamp_millis(),
            "paymentId": payment_id,
        }))
    })
    .take(STREAM_HEARTBEAT_COUNT);

    let timeout = futures::stream::once(async {
        tokio::time::sleep(STREAM_HEARTBEAT).await;
        sse_event(&json!({
            "type": "timeout",
            "message": "Stream timeout after 5 minutes",
        }))
    });

    let events = connected
        .chain(heartbeats)
        .chain(timeout)
        .map(Ok::<_, actix_web::Error>);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(events)
}

/// Storefront catalog with sats prices at the current exchange rate.
#[get("/products")]
pub async fn products(state: web::Data<AppState>) -> HttpResponse {
    match lightmarket::products::priced_catalog(&state.rates).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            tracing::error!(error = %e, "failed to price catalog");
            HttpResponse::BadGateway().json(json!({
                "message": "Unable to fetch Bitcoin price. Please try again later."
            }))
        }
    }
}

#[get("/products/{id}")]
pub async fn product_detail(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match lightmarket::products::priced_product(&id, &state.rates).await {
        Ok(Some(product)) => HttpResponse::Ok().json(product),
        Ok(None) => HttpResponse::NotFound().json(json!({ "message": "Product not found" })),
        Err(e) => {
            tracing::error!(error = %e, "failed to price product");
            HttpResponse::BadGateway().json(json!({
                "message": "Unable to fetch Bitcoin price. Please try again later."
            }))
        }
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "lightmarket-server",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Cached public metrics opt-in flag, read once at first access.
static PUBLIC_METRICS: std::sync::LazyLock<bool> = std::sync::LazyLock::new(|| {
    std::env::var("LIGHTMARKET_PUBLIC_METRICS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
});

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| lightmarket::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            // No token configured — metrics stay protected by default.
            if !*PUBLIC_METRICS {
                return HttpResponse::Forbidden().json(json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or LIGHTMARKET_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
