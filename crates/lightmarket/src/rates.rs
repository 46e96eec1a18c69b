//! BTC/USD exchange rate with a time-bucketed cache.
//!
//! Catalog prices are set in USD and converted to sats at request time. The
//! upstream quote API is rate-limited, so a fetched price stays fresh for
//! five minutes and a failed refresh falls back to the stale cached price.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::LightmarketError;

/// How long a fetched price stays fresh.
pub const CACHE_DURATION: Duration = Duration::from_secs(300);

pub const SATS_PER_BTC: f64 = 100_000_000.0;

const COINGECKO_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct SimplePrice {
    bitcoin: UsdQuote,
}

#[derive(Deserialize)]
struct UsdQuote {
    usd: f64,
}

struct CachedPrice {
    usd: f64,
    fetched_at: Instant,
}

pub struct RateCache {
    http: reqwest::Client,
    url: String,
    cache_for: Duration,
    cached: Mutex<Option<CachedPrice>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::with_url(COINGECKO_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            cache_for: CACHE_DURATION,
            cached: Mutex::new(None),
        }
    }

    pub fn with_cache_duration(mut self, cache_for: Duration) -> Self {
        self.cache_for = cache_for;
        self
    }

    /// Pre-populate the cache with a fixed price. Useful for offline
    /// environments and tests.
    pub async fn seed_price(&self, usd: f64) {
        let mut cached = self.cached.lock().await;
        *cached = Some(CachedPrice {
            usd,
            fetched_at: Instant::now(),
        });
    }

    /// Current BTC price in USD: the cached value inside its freshness
    /// bucket, a fresh fetch otherwise, the stale cached value if the fetch
    /// fails. Errors only when no price has ever been fetched.
    pub async fn bitcoin_price_usd(&self) -> Result<f64, LightmarketError> {
        let mut cached = self.cached.lock().await;

        if let Some(price) = cached.as_ref() {
            if price.fetched_at.elapsed() < self.cache_for {
                return Ok(price.usd);
            }
        }

        match self.fetch_price().await {
            Ok(usd) => {
                *cached = Some(CachedPrice {
                    usd,
                    fetched_at: Instant::now(),
                });
                Ok(usd)
            }
            Err(e) => match cached.as_ref() {
                Some(stale) => {
                    tracing::warn!(error = %e, price = stale.usd, "price refresh failed, serving stale cached price");
                    Ok(stale.usd)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_price(&self) -> Result<f64, LightmarketError> {
        let resp = self
            .http
            .get(&self.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| LightmarketError::Http(format!("price request failed: {e}")))?;

        let quote: SimplePrice = resp
            .json()
            .await
            .map_err(|e| LightmarketError::Http(format!("price response parse failed: {e}")))?;

        if !quote.bitcoin.usd.is_finite() || quote.bitcoin.usd <= 0.0 {
            return Err(LightmarketError::Http(format!(
                "implausible bitcoin price: {}",
                quote.bitcoin.usd
            )));
        }
        Ok(quote.bitcoin.usd)
    }

    pub async fn usd_to_sats(&self, usd: f64) -> Result<u64, LightmarketError> {
        let price = self.bitcoin_price_usd().await?;
        Ok((usd / price * SATS_PER_BTC).round() as u64)
    }

    pub async fn sats_to_usd(&self, sats: u64) -> Result<f64, LightmarketError> {
        let price = self.bitcoin_price_usd().await?;
        Ok(sats as f64 / SATS_PER_BTC * price)
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}
