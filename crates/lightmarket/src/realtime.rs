//! Client for the Ably realtime relay.
//!
//! Two concerns, both pass-throughs to the relay's managed service: a
//! best-effort channel publish used on the webhook hot path, and issuance
//! of short-lived subscribe-only token requests for browser sessions.

use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::error::LightmarketError;
use crate::notify::NotificationPayload;

/// Default relay REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://rest.ably.io";

/// Token lifetime handed to browser sessions: one hour, in millis.
pub const TOKEN_TTL_MS: i64 = 3_600_000;

/// Publish timeout. The webhook handler must never hang on the relay.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RealtimeClient {
    http: reqwest::Client,
    key_name: String,
    key_secret: String,
    rest_url: String,
}

/// Signed token request handed to the browser, which exchanges it with the
/// relay for a subscribe-only token. Field names and the MAC construction
/// are fixed by the relay's auth scheme.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub key_name: String,
    pub ttl: i64,
    pub capability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub timestamp: i64,
    pub nonce: String,
    pub mac: String,
}

impl RealtimeClient {
    /// Parse a `name:secret` relay API key.
    pub fn from_api_key(
        api_key: &str,
        rest_url: impl Into<String>,
    ) -> Result<Self, LightmarketError> {
        let (key_name, key_secret) = api_key.split_once(':').ok_or_else(|| {
            LightmarketError::Config("relay API key must be in name:secret form".into())
        })?;
        if key_name.is_empty() || key_secret.is_empty() {
            return Err(LightmarketError::Config(
                "relay API key has an empty name or secret".into(),
            ));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            key_name: key_name.to_string(),
            key_secret: key_secret.to_string(),
            rest_url: rest_url.into(),
        })
    }

    /// Publish one event to one channel. Best-effort by contract: callers
    /// log a failure and move on, relying on the mailbox/poll path.
    pub async fn publish(
        &self,
        channel: &str,
        event_name: &str,
        payload: &NotificationPayload,
    ) -> Result<(), LightmarketError> {
        let url = format!(
            "{}/channels/{channel}/messages",
            self.rest_url.trim_end_matches('/')
        );
        let message = json!({ "name": event_name, "data": payload });

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.key_name, Some(&self.key_secret))
            .json(&message)
            .timeout(PUBLISH_TIMEOUT)
            .send()
            .await
            .map_err(|e| LightmarketError::Relay(format!("publish request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(LightmarketError::Relay(format!(
                "publish returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Issue a subscribe-only token request scoped to `channel` (a literal
    /// channel name or the `payment-*` wildcard).
    pub fn create_token_request(
        &self,
        channel: &str,
        client_id: Option<&str>,
    ) -> Result<TokenRequest, LightmarketError> {
        let capability = serde_json::to_string(&json!({ channel: ["subscribe"] }))?;
        let timestamp = Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().simple().to_string();

        // Canonical signing text fixed by the relay: each field on its own
        // newline-terminated line, empty string for an absent client id.
        let sign_text = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            self.key_name,
            TOKEN_TTL_MS,
            capability,
            client_id.unwrap_or(""),
            timestamp,
            nonce
        );
        let mac = base64::engine::general_purpose::STANDARD
            .encode(crate::hmac::compute_tag(self.key_secret.as_bytes(), sign_text.as_bytes()));

        Ok(TokenRequest {
            key_name: self.key_name.clone(),
            ttl: TOKEN_TTL_MS,
            capability,
            client_id: client_id.map(String::from),
            timestamp,
            nonce,
            mac,
        })
    }
}
