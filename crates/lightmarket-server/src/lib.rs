//! Storefront API server.
//!
//! Hosts the webhook bridge (inbound processor webhooks → realtime publish +
//! fallback mailbox), the status poll, realtime token issuance, the
//! processor pass-throughs and the priced catalog.

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
