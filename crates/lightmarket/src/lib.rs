//! Lightning storefront core library.
//!
//! The heart of the crate is the webhook-to-realtime-notification bridge:
//!
//! - [`hmac`] — verifies that an inbound webhook really came from the
//!   payment processor (HMAC-SHA256 over the raw body, constant-time compare)
//! - [`notify`] — classifies verified events and derives the channel,
//!   subscriber event name and outbound payload
//! - [`mailbox`] — the process-local fallback store a browser polls when it
//!   missed the realtime event (one-shot reads, 10-minute TTL)
//!
//! Around the bridge sit pass-through clients for the payment processor
//! ([`nakapay`]) and the realtime relay ([`realtime`]), plus the storefront
//! catalog ([`products`]) priced via a cached BTC/USD rate ([`rates`]).
//!
//! # Delivery model
//!
//! Delivery is best-effort, at-most-once: a verified event is published to
//! its `payment-{id}` channel and parked in the mailbox; a browser that
//! missed the publish recovers it exactly once by polling. There is no
//! retry engine — the polling client is the retry mechanism.

pub mod error;
pub mod hmac;
pub mod invoice;
pub mod mailbox;
pub mod nakapay;
pub mod notify;
pub mod products;
pub mod rates;
pub mod realtime;
pub mod security;
pub mod webhook;

pub use error::LightmarketError;
pub use mailbox::{InMemoryMailbox, MailboxStore, SqliteMailbox};
pub use notify::{
    channel_name, realtime_event_name, route, NotificationPayload, PaymentStatus, Routing,
};
pub use webhook::{parse_envelope, EventKind, WebhookEnvelope};
