//! CoinGecko v3 implementation of [`MarketDataSource`].

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

use crate::market_data::{MarketDataError, MarketDataSource, MarketSnapshotRow, PriceSeries};
use crate::storage_utils::ApiConfig;

pub const VS_CURRENCY: &str = "usd";
pub const CHANGE_WINDOWS: &str = "1h,24h,7d,14d";
pub const PAGE_SIZE: u32 = 250;
pub const MARKET_ORDER: &str = "market_cap_desc";
pub const HISTORY_DAYS: u32 = 30;
pub const HISTORY_INTERVAL: &str = "daily";

// Token ids end up in the URL path.
static TOKEN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("token id pattern is valid"));

#[derive(Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
}

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    http: Client,
}

impl CoinGeckoClient {
    pub fn new(config: &ApiConfig) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn markets_query() -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", VS_CURRENCY.to_string()),
            ("price_change_percentage", CHANGE_WINDOWS.to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("order", MARKET_ORDER.to_string()),
        ]
    }

    fn history_query() -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", VS_CURRENCY.to_string()),
            ("days", HISTORY_DAYS.to_string()),
            ("interval", HISTORY_INTERVAL.to_string()),
        ]
    }
}

pub fn validate_token_id(token_id: &str) -> Result<(), MarketDataError> {
    if TOKEN_ID.is_match(token_id) {
        Ok(())
    } else {
        Err(MarketDataError::InvalidTokenId(token_id.to_string()))
    }
}

/// Pulls the human-readable message out of a CoinGecko error body. Both
/// `{"error": ".."}` and `{"status": {"error_message": ".."}}` shapes occur.
fn upstream_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error")
                .and_then(Value::as_str)
                .or_else(|| v.pointer("/status/error_message").and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown error".to_string())
}

async fn ensure_success(response: Response) -> Result<Response, MarketDataError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MarketDataError::Status {
        status: status.as_u16(),
        message: upstream_error_message(&body),
    })
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn fetch_markets(&self) -> Result<Vec<MarketSnapshotRow>, MarketDataError> {
        let url = format!("{}/coins/markets", self.base_url);
        tracing::debug!(%url, "requesting markets listing");

        let response = self
            .http
            .get(&url)
            .query(&Self::markets_query())
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| MarketDataError::Decode(e.to_string()))
    }

    async fn fetch_price_history(&self, token_id: &str) -> Result<PriceSeries, MarketDataError> {
        validate_token_id(token_id)?;
        let url = format!("{}/coins/{}/market_chart", self.base_url, token_id);
        tracing::debug!(%url, "requesting price history");

        let response = self
            .http
            .get(&url)
            .query(&Self::history_query())
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await?;
        let chart: MarketChart =
            serde_json::from_slice(&bytes).map_err(|e| MarketDataError::Decode(e.to_string()))?;
        Ok(PriceSeries::from_raw(token_id, &chart.prices))
    }
}
