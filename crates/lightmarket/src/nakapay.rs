//! Client for the NakaPay payment-processor API.
//!
//! Invoice creation, settlement and status live entirely on the processor's
//! side; this client is a thin authenticated pass-through.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::error::LightmarketError;

/// Default processor API base URL.
pub const DEFAULT_API_URL: &str = "https://api.nakapay.app";

/// Request timeout for processor calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct NakaPayClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    business_profile: OnceCell<BusinessProfile>,
}

/// The merchant profile holding the destination lightning address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub lightning_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Amount in sats.
    pub amount: u64,
    pub description: String,
    pub destination_wallet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// A payment request as the processor reports it. Returned to the
/// storefront client unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// BOLT11 lightning invoice to present to the payer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl NakaPayClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            business_profile: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Resolve the merchant profile, fetching at most once per process
    /// lifetime. The destination lightning address rarely changes, so the
    /// first successful fetch is reused for every subsequent payment.
    pub async fn business_profile(&self) -> Result<&BusinessProfile, LightmarketError> {
        self.business_profile
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .get(self.url("/api/business/profile"))
                    .bearer_auth(&self.api_key)
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| {
                        LightmarketError::Processor(format!("profile request failed: {e}"))
                    })?;

                if !resp.status().is_success() {
                    return Err(LightmarketError::Processor(format!(
                        "profile request returned {}",
                        resp.status()
                    )));
                }

                resp.json::<BusinessProfile>().await.map_err(|e| {
                    LightmarketError::Processor(format!("profile response parse failed: {e}"))
                })
            })
            .await
    }

    /// Create a payment request (lightning invoice) with the processor.
    pub async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentRequest, LightmarketError> {
        let resp = self
            .http
            .post(self.url("/api/payment-requests"))
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| LightmarketError::Processor(format!("create request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(LightmarketError::Processor(format!(
                "create request returned {}",
                resp.status()
            )));
        }

        resp.json::<PaymentRequest>()
            .await
            .map_err(|e| LightmarketError::Processor(format!("create response parse failed: {e}")))
    }

    /// Fetch the current state of a payment request.
    pub async fn get_payment_request(&self, id: &str) -> Result<PaymentRequest, LightmarketError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/payment-requests/{id}")))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| LightmarketError::Processor(format!("status request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(LightmarketError::Processor(format!(
                "status request returned {}",
                resp.status()
            )));
        }

        resp.json::<PaymentRequest>()
            .await
            .map_err(|e| LightmarketError::Processor(format!("status response parse failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_request_parses_processor_response() {
        let raw = r#"{
            "id": "pay_1",
            "amount": 1500,
            "description": "Lightning Icon Pack",
            "invoice": "lnbc15u1p...",
            "status": "pending",
            "checkoutUrl": "https://checkout.nakapay.app/pay_1"
        }"#;
        let payment: PaymentRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(payment.id, "pay_1");
        assert_eq!(payment.amount, 1500);
        assert_eq!(payment.status, "pending");
        assert_eq!(
            payment.checkout_url.as_deref(),
            Some("https://checkout.nakapay.app/pay_1")
        );
    }

    #[test]
    fn create_request_serializes_camel_case() {
        let request = CreatePaymentRequest {
            amount: 1000,
            description: "Coffee Tip".to_string(),
            destination_wallet: "merchant@getalby.com".to_string(),
            metadata: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["amount"], 1000);
        assert_eq!(value["destinationWallet"], "merchant@getalby.com");
        assert!(value.get("metadata").is_none());
    }

    #[tokio::test]
    async fn unreachable_processor_surfaces_error() {
        let client = NakaPayClient::new("test-key", "http://localhost:1");
        let err = client.get_payment_request("pay_1").await.unwrap_err();
        assert!(matches!(err, LightmarketError::Processor(_)));
    }
}
