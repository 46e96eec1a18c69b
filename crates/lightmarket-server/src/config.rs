use std::time::Duration;

use lightmarket::mailbox::DEFAULT_TTL;
use lightmarket::nakapay::DEFAULT_API_URL;

/// Environment-derived server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub webhook_secret: Option<Vec<u8>>,
    pub nakapay_api_key: Option<String>,
    pub nakapay_api_url: String,
    pub ably_api_key: Option<String>,
    pub mailbox_db_path: Option<String>,
    pub mailbox_ttl: Duration,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let webhook_secret = non_empty("NAKAPAY_WEBHOOK_SECRET").map(String::into_bytes);
        match &webhook_secret {
            Some(secret) if secret.len() < 32 => {
                tracing::warn!(
                    "NAKAPAY_WEBHOOK_SECRET is only {} bytes (minimum 32 recommended) — \
                     use `openssl rand -hex 32` to generate a secure secret",
                    secret.len()
                );
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    "NAKAPAY_WEBHOOK_SECRET not set — webhook deliveries will be rejected with 500"
                );
            }
        }

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3002);

        let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(120);

        let mailbox_ttl = std::env::var("MAILBOX_TTL_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);

        let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            port,
            webhook_secret,
            nakapay_api_key: non_empty("NAKAPAY_API_KEY"),
            nakapay_api_url: non_empty("NAKAPAY_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            ably_api_key: non_empty("ABLY_API_KEY"),
            mailbox_db_path: non_empty("MAILBOX_DB_PATH"),
            mailbox_ttl,
            rate_limit_rpm,
            allowed_origins,
            metrics_token: non_empty("METRICS_TOKEN").map(String::into_bytes),
        }
    }
}
