use std::sync::Arc;
use std::time::Duration;

use lightmarket::mailbox::MailboxStore;
use lightmarket::nakapay::NakaPayClient;
use lightmarket::rates::RateCache;
use lightmarket::realtime::RealtimeClient;

/// Shared application state for the storefront server.
pub struct AppState {
    /// Shared secret for verifying inbound processor webhooks. A missing
    /// secret is a per-request configuration error (500) — it is never
    /// silently defaulted.
    pub webhook_secret: Option<Vec<u8>>,
    /// Fallback mailbox consumed by the status poll.
    pub mailbox: Arc<dyn MailboxStore>,
    pub mailbox_ttl: Duration,
    /// Realtime relay client; `None` when the relay key is unconfigured,
    /// in which case clients are served by the poll fallback only.
    pub realtime: Option<RealtimeClient>,
    /// Processor API client; `None` when the API key is unconfigured.
    pub nakapay: Option<NakaPayClient>,
    pub rates: RateCache,
    /// Separate bearer token for /metrics (not the webhook secret).
    pub metrics_token: Option<Vec<u8>>,
}
