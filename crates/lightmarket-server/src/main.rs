use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightmarket::mailbox::{start_mailbox_sweeper, InMemoryMailbox, MailboxStore, SqliteMailbox};
use lightmarket::nakapay::NakaPayClient;
use lightmarket::rates::RateCache;
use lightmarket::realtime::RealtimeClient;

use lightmarket_server::config::ServerConfig;
use lightmarket_server::routes;
use lightmarket_server::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-nakapay-signature"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-nakapay-signature"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let mailbox: Arc<dyn MailboxStore> = match &config.mailbox_db_path {
        Some(path) => match SqliteMailbox::open(path, config.mailbox_ttl) {
            Ok(store) => {
                tracing::info!("Mailbox store: SQLite at {path}");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("Failed to open SQLite mailbox at {path}: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::info!("Mailbox store: in-memory (entries are lost on restart)");
            Arc::new(InMemoryMailbox::new(config.mailbox_ttl))
        }
    };

    // Safety net behind the per-entry expiry tasks.
    start_mailbox_sweeper(Arc::clone(&mailbox), Duration::from_secs(60));

    let realtime = match &config.ably_api_key {
        Some(key) => match RealtimeClient::from_api_key(key, lightmarket::realtime::DEFAULT_REST_URL)
        {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Invalid ABLY_API_KEY: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!(
                "ABLY_API_KEY not set — realtime delivery disabled, clients fall back to polling"
            );
            None
        }
    };

    let nakapay = config
        .nakapay_api_key
        .as_ref()
        .map(|key| NakaPayClient::new(key.clone(), config.nakapay_api_url.clone()));
    if nakapay.is_none() {
        tracing::warn!("NAKAPAY_API_KEY not set — payment creation and status lookups will fail");
    }

    let state = web::Data::new(AppState {
        webhook_secret: config.webhook_secret.clone(),
        mailbox,
        mailbox_ttl: config.mailbox_ttl,
        realtime,
        nakapay,
        rates: RateCache::new(),
        metrics_token: config.metrics_token.clone(),
    });

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    let cors_origins = config.allowed_origins.clone();
    let port = config.port;

    tracing::info!("Lightmarket storefront server listening on port {port}");
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  POST http://localhost:{port}/webhooks/nakapay");
    tracing::info!("  GET  http://localhost:{port}/payments/status");
    tracing::info!("  POST http://localhost:{port}/realtime-token");
    tracing::info!("  POST http://localhost:{port}/payments");
    tracing::info!("  GET  http://localhost:{port}/products");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::nakapay_webhook)
            // Literal routes before `/payments/{id}` so they match first.
            .service(routes::payment_status_poll)
            .service(routes::payment_stream)
            .service(routes::payment_detail)
            .service(routes::create_payment)
            .service(routes::realtime_token)
            .service(routes::products)
            .service(routes::product_detail)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
