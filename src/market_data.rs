//! Market data types, the upstream source seam and the caching service in
//! front of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Clock, SystemClock, TtlCache};

/// Markets snapshots are reused for 12 hours.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode upstream payload: {0}")]
    Decode(String),

    #[error("invalid token id {0:?}")]
    InvalidTokenId(String),
}

// --- Snapshot rows ---

/// One token as listed by the markets endpoint. Any numeric field may be
/// `null` upstream for thinly traded tokens.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MarketSnapshotRow {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub high_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub total_volume: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub market_cap: Option<f64>,
    #[serde(
        rename = "price_change_percentage_1h_in_currency",
        default,
        deserialize_with = "deserialize_f64_lenient"
    )]
    pub change_1h: Option<f64>,
    #[serde(
        rename = "price_change_percentage_24h_in_currency",
        default,
        deserialize_with = "deserialize_f64_lenient"
    )]
    pub change_24h: Option<f64>,
    #[serde(
        rename = "price_change_percentage_7d_in_currency",
        default,
        deserialize_with = "deserialize_f64_lenient"
    )]
    pub change_7d: Option<f64>,
    #[serde(
        rename = "price_change_percentage_14d_in_currency",
        default,
        deserialize_with = "deserialize_f64_lenient"
    )]
    pub change_14d: Option<f64>,
}

/// Rows as delivered (market cap descending) plus the time they were taken.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub rows: Vec<MarketSnapshotRow>,
}

// --- Price history ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Daily prices for one token, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    pub token_id: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Builds a series from raw `[ms, price]` pairs, dropping unusable points
    /// and sorting by time.
    pub fn from_raw(token_id: &str, raw: &[[f64; 2]]) -> Self {
        let mut points: Vec<PricePoint> = raw
            .iter()
            .filter(|[_, price]| price.is_finite())
            .filter_map(|&[ts_ms, price]| {
                let timestamp = DateTime::from_timestamp_millis(ts_ms as i64)?;
                Some(PricePoint { timestamp, price })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);

        Self {
            token_id: token_id.to_string(),
            points,
        }
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }
}

// --- Lenient number decoding ---

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, a numeric string or null")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v).filter(|v| v.is_finite()))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

// --- Source seam ---

/// Upstream market data provider.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Top tokens by market cap, in upstream order.
    async fn fetch_markets(&self) -> Result<Vec<MarketSnapshotRow>, MarketDataError>;

    /// Daily USD prices for the last 30 days.
    async fn fetch_price_history(&self, token_id: &str) -> Result<PriceSeries, MarketDataError>;
}

/// Puts the snapshot cache in front of a [`MarketDataSource`].
pub struct MarketDataService<S, C = SystemClock> {
    source: S,
    snapshots: TtlCache<(), Arc<MarketSnapshot>, C>,
}

impl<S: MarketDataSource> MarketDataService<S, SystemClock> {
    pub fn new(source: S) -> Self {
        Self::with_cache(source, TtlCache::new(SNAPSHOT_TTL))
    }
}

impl<S: MarketDataSource, C: Clock> MarketDataService<S, C> {
    pub fn with_cache(source: S, snapshots: TtlCache<(), Arc<MarketSnapshot>, C>) -> Self {
        Self { source, snapshots }
    }

    /// Returns the cached snapshot while it is fresh, otherwise fetches a new
    /// one. Failed fetches are not cached.
    pub async fn markets(&mut self) -> Result<Arc<MarketSnapshot>, MarketDataError> {
        if let Some(snapshot) = self.snapshots.get(&()) {
            tracing::debug!(
                rows = snapshot.rows.len(),
                expires_in_secs = ?self.snapshots.time_remaining(&()).map(|d| d.as_secs()),
                "markets snapshot served from cache"
            );
            return Ok(snapshot);
        }

        let rows = self.source.fetch_markets().await?;
        let snapshot = Arc::new(MarketSnapshot {
            fetched_at: Utc::now(),
            rows,
        });
        tracing::info!(
            rows = snapshot.rows.len(),
            ttl_secs = self.snapshots.ttl().as_secs(),
            "fetched fresh markets snapshot"
        );
        self.snapshots.insert((), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Histories are not cached.
    pub async fn price_history(&self, token_id: &str) -> Result<PriceSeries, MarketDataError> {
        self.source.fetch_price_history(token_id).await
    }
}
