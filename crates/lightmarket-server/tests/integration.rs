use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};

use lightmarket::hmac::compute_signature;
use lightmarket::mailbox::InMemoryMailbox;
use lightmarket::nakapay::NakaPayClient;
use lightmarket::rates::RateCache;
use lightmarket::realtime::RealtimeClient;

use lightmarket_server::routes;
use lightmarket_server::state::AppState;

const SECRET: &[u8] = b"test-webhook-secret";

/// An AppState with an empty in-memory mailbox and no external clients.
fn base_state(webhook_secret: Option<&[u8]>) -> AppState {
    AppState {
        webhook_secret: webhook_secret.map(|s| s.to_vec()),
        mailbox: Arc::new(InMemoryMailbox::new(Duration::from_secs(600))),
        mailbox_ttl: Duration::from_secs(600),
        realtime: None,
        nakapay: None,
        rates: RateCache::with_url("http://localhost:1/price"),
        metrics_token: None,
    }
}

fn signed_webhook(body: &'static str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/webhooks/nakapay")
        .set_payload(body)
        .insert_header(("Content-Type", "application/json"))
        .insert_header((
            "X-Nakapay-Signature",
            compute_signature(SECRET, body.as_bytes()),
        ))
}

#[actix_rt::test]
async fn completed_webhook_is_polled_exactly_once() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let body = r#"{"event":"payment.completed","payment_id":"pay_1","amount":1000,"description":"Modern Dashboard UI Kit"}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(test::read_body(resp).await, "OK");

    // First poll consumes the parked notification.
    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_1")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], true);
    assert_eq!(poll["status"], "completed");
    assert_eq!(poll["amount"], 1000);
    assert_eq!(poll["paymentId"], "pay_1");
    assert!(poll["timestamp"].as_i64().unwrap() > 0);

    // Second poll sees nothing.
    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_1")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
    assert_eq!(poll["paymentId"], "pay_1");
}

#[actix_rt::test]
async fn invalid_signature_is_rejected_without_side_effects() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/webhooks/nakapay")
        .set_payload(r#"{"event":"payment.completed","payment_id":"pay_2","amount":1000}"#)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Nakapay-Signature", "deadbeef"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_2")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
}

#[actix_rt::test]
async fn missing_signature_header_is_rejected() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app =
        test::init_service(App::new().app_data(state).service(routes::nakapay_webhook)).await;

    let req = test::TestRequest::post()
        .uri("/webhooks/nakapay")
        .set_payload(r#"{"event":"payment.completed","payment_id":"pay_2"}"#)
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_rt::test]
async fn pending_event_is_acknowledged_but_not_parked() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let body = r#"{"event":"payment.pending","payment_id":"pay_3"}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_3")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
}

#[actix_rt::test]
async fn unrecognized_event_is_acknowledged_but_dropped() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let body = r#"{"event":"payment.refunded","payment_id":"pay_4","amount":500}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_4")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
}

#[actix_rt::test]
async fn failed_event_carries_reason_to_poll() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let body = r#"{"event":"payment.failed","payment_id":"pay_5","failure_reason":"invoice expired before payment"}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_5")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], true);
    assert_eq!(poll["status"], "failed");
    assert_eq!(poll["reason"], "invoice expired before payment");
}

#[actix_rt::test]
async fn missing_secret_is_a_configuration_error() {
    let state = web::Data::new(base_state(None));
    let app =
        test::init_service(App::new().app_data(state).service(routes::nakapay_webhook)).await;

    let body = r#"{"event":"payment.completed","payment_id":"pay_6"}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn malformed_body_with_valid_signature_is_a_server_error() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app =
        test::init_service(App::new().app_data(state).service(routes::nakapay_webhook)).await;

    let resp = test::call_service(&app, signed_webhook("not json at all").to_request()).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn legacy_nested_payment_shape_is_a_server_error() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app =
        test::init_service(App::new().app_data(state).service(routes::nakapay_webhook)).await;

    // Only the flat payment_id schema is supported.
    let body = r#"{"event":"payment.completed","payment":{"id":"pay_7"}}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn unreachable_relay_does_not_fail_the_webhook() {
    // Point the relay at a dead endpoint: the publish fails, the webhook is
    // still acknowledged and the mailbox still written.
    let mut state = base_state(Some(SECRET));
    state.realtime =
        Some(RealtimeClient::from_api_key("name:secret", "http://localhost:1").unwrap());
    let state = web::Data::new(state);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let body = r#"{"event":"payment.completed","payment_id":"pay_8","amount":2500}"#;
    let resp = test::call_service(&app, signed_webhook(body).to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_8")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], true);
    assert_eq!(poll["amount"], 2500);
}

#[actix_rt::test]
async fn overwritten_entry_polls_as_latest_write() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::nakapay_webhook)
            .service(routes::payment_status_poll),
    )
    .await;

    let first =
        r#"{"event":"payment.failed","payment_id":"pay_9","failure_reason":"route not found"}"#;
    let second = r#"{"event":"payment.completed","payment_id":"pay_9","amount":4200}"#;
    let resp = test::call_service(&app, signed_webhook(first).to_request()).await;
    assert_eq!(resp.status(), 200);
    let resp = test::call_service(&app, signed_webhook(second).to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_9")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], true);
    assert_eq!(poll["status"], "completed");
    assert_eq!(poll["amount"], 4200);

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_9")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
}

#[actix_rt::test]
async fn status_poll_requires_payment_id() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::payment_status_poll),
    )
    .await;

    let req = test::TestRequest::get().uri("/payments/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn realtime_token_requires_configured_relay() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app =
        test::init_service(App::new().app_data(state).service(routes::realtime_token)).await;

    let req = test::TestRequest::post().uri("/realtime-token").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn realtime_token_scopes_to_requested_payment() {
    let mut state = base_state(Some(SECRET));
    state.realtime = Some(
        RealtimeClient::from_api_key("appkey.name:topsecret", "http://localhost:1").unwrap(),
    );
    let state = web::Data::new(state);
    let app =
        test::init_service(App::new().app_data(state).service(routes::realtime_token)).await;

    let req = test::TestRequest::post()
        .uri("/realtime-token")
        .set_json(serde_json::json!({ "paymentId": "pay_1", "clientId": "browser-7" }))
        .to_request();
    let token: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(token["keyName"], "appkey.name");
    assert_eq!(token["capability"], r#"{"payment-pay_1":["subscribe"]}"#);
    assert_eq!(token["clientId"], "browser-7");
    assert_eq!(token["ttl"], 3_600_000);
    assert!(!token["mac"].as_str().unwrap().is_empty());
}

#[actix_rt::test]
async fn realtime_token_defaults_to_wildcard_scope() {
    let mut state = base_state(Some(SECRET));
    state.realtime = Some(
        RealtimeClient::from_api_key("appkey.name:topsecret", "http://localhost:1").unwrap(),
    );
    let state = web::Data::new(state);
    let app =
        test::init_service(App::new().app_data(state).service(routes::realtime_token)).await;

    // No body at all: token covers any payment channel.
    let req = test::TestRequest::post().uri("/realtime-token").to_request();
    let token: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(token["capability"], r#"{"payment-*":["subscribe"]}"#);
    assert!(token.get("clientId").is_none());
}

#[actix_rt::test]
async fn create_payment_validates_input_before_the_processor() {
    let mut state = base_state(Some(SECRET));
    state.nakapay = Some(NakaPayClient::new("test-key", "http://localhost:1"));
    let state = web::Data::new(state);
    let app =
        test::init_service(App::new().app_data(state).service(routes::create_payment)).await;

    let req = test::TestRequest::post()
        .uri("/payments")
        .set_json(serde_json::json!({ "description": "Coffee Tip" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/payments")
        .set_json(serde_json::json!({ "amount": 1000, "description": "" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn create_payment_requires_api_key() {
    let state = web::Data::new(base_state(Some(SECRET)));
    let app =
        test::init_service(App::new().app_data(state).service(routes::create_payment)).await;

    let req = test::TestRequest::post()
        .uri("/payments")
        .set_json(serde_json::json!({ "amount": 1000, "description": "Coffee Tip" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn products_served_from_seeded_rate_cache() {
    let state = web::Data::new(base_state(Some(SECRET)));
    state.rates.seed_price(50_000.0).await;
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::products)
            .service(routes::product_detail),
    )
    .await;

    let req = test::TestRequest::get().uri("/products").to_request();
    let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list.as_array().unwrap().len(), 6);

    let req = test::TestRequest::get().uri("/products/micro-1").to_request();
    let product: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(product["priceSats"], 500);

    let req = test::TestRequest::get().uri("/products/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn health_reports_ok() {
    let app = test::init_service(App::new().service(routes::health)).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "lightmarket-server");
}

#[actix_rt::test]
async fn status_poll_matches_before_payment_id_route() {
    // `/payments/status` must hit the poll handler, not `/payments/{id}`.
    let state = web::Data::new(base_state(Some(SECRET)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .service(routes::payment_status_poll)
            .service(routes::payment_detail),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/payments/status?paymentId=pay_1")
        .to_request();
    let poll: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["hasUpdate"], false);
}
