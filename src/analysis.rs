//! This module contains the core analysis pipeline logic.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::cache::Clock;
use crate::indicators;
use crate::market_data::{MarketDataService, MarketDataSource};
use crate::scorer::{self, RankedTable};
use crate::storage_utils::RsiConfig;

/// Everything the presenters need for one dashboard load.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub table: RankedTable,
    pub fetched_at: Option<DateTime<Utc>>,
    pub rsi_enabled: bool,
    /// Problems worth showing to the user (failed fetches and the like).
    pub notices: Vec<String>,
}

/// Runs the full analysis pipeline:
/// 1. Fetches the markets snapshot (cached for 12 hours).
/// 2. Derives indicators, normalizes and scores every token.
/// 3. Optionally fetches price histories for the leading tokens and attaches
///    their RSI. RSI is display-only and never feeds the score.
///
/// Upstream failures never abort the run; they become notices and the table
/// is built from whatever data is available.
pub async fn run_analysis_pipeline<S, C>(
    service: &mut MarketDataService<S, C>,
    rsi: &RsiConfig,
) -> Dashboard
where
    S: MarketDataSource,
    C: Clock,
{
    let mut dashboard = Dashboard {
        rsi_enabled: rsi.enabled,
        ..Dashboard::default()
    };

    // Step 1: Fetch snapshot
    let snapshot = match service.markets().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "markets fetch failed");
            dashboard
                .notices
                .push(format!("Error fetching market data: {e}"));
            return dashboard;
        }
    };
    dashboard.fetched_at = Some(snapshot.fetched_at);

    // Step 2: Score
    dashboard.table = scorer::rank_snapshot(&snapshot.rows);
    tracing::info!(
        tokens = dashboard.table.len(),
        scored = dashboard.table.rows.iter().filter(|r| r.score.is_some()).count(),
        "ranked snapshot"
    );

    // Step 3: RSI enrichment
    if rsi.enabled {
        let notices = attach_rsi(service, &mut dashboard.table, rsi.max_tokens).await;
        dashboard.notices.extend(notices);
    }

    dashboard
}

/// Fetches histories one token at a time, in rank order, for the first
/// `max_tokens` rows. Returns one notice per failed fetch.
pub async fn attach_rsi<S, C>(
    service: &MarketDataService<S, C>,
    table: &mut RankedTable,
    max_tokens: usize,
) -> Vec<String>
where
    S: MarketDataSource,
    C: Clock,
{
    let ids: Vec<String> = table
        .rows
        .iter()
        .take(max_tokens)
        .map(|r| r.row.id.clone())
        .collect();

    let results: Vec<_> = stream::iter(ids)
        .then(|id| async move {
            let history = service.price_history(&id).await;
            (id, history)
        })
        .collect()
        .await;

    let mut notices = Vec::new();
    for (row, (id, history)) in table.rows.iter_mut().zip(results) {
        match history {
            Ok(series) => {
                row.rsi = indicators::calculate_rsi(&series);
                tracing::debug!(token = %series.token_id, points = series.points.len(), rsi = ?row.rsi, "rsi computed");
            }
            Err(e) => {
                tracing::warn!(token = %id, error = %e, "price history fetch failed");
                notices.push(format!("Error fetching data for {id}: {e}"));
            }
        }
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::cache::tests::ManualClock;
    use crate::market_data::SNAPSHOT_TTL;
    use crate::market_data::tests::{StubSource, row};

    fn service(source: StubSource) -> MarketDataService<StubSource, ManualClock> {
        MarketDataService::with_cache(source, TtlCache::with_clock(SNAPSHOT_TTL, ManualClock::new()))
    }

    fn three_tokens() -> Vec<crate::market_data::MarketSnapshotRow> {
        [("up", 10.0), ("down", -5.0), ("flat", 0.0)]
            .into_iter()
            .map(|(id, change)| {
                let mut r = row(id);
                r.change_7d = Some(change);
                r
            })
            .collect()
    }

    #[tokio::test]
    async fn strongest_seven_day_token_ranks_first() {
        let mut service = service(StubSource::new().with_markets(three_tokens()));

        let dashboard = run_analysis_pipeline(&mut service, &RsiConfig::default()).await;

        assert!(dashboard.notices.is_empty());
        assert!(dashboard.fetched_at.is_some());
        assert_eq!(dashboard.table.rows[0].row.id, "up");
        assert!(dashboard.table.rows.iter().all(|r| r.rsi.is_none()));
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_table_and_notice() {
        let mut service = service(StubSource::new().with_markets_error("Too Many Requests"));

        let dashboard = run_analysis_pipeline(&mut service, &RsiConfig::default()).await;

        assert!(dashboard.table.is_empty());
        assert!(dashboard.fetched_at.is_none());
        assert_eq!(dashboard.notices.len(), 1);
        assert!(dashboard.notices[0].contains("Too Many Requests"));
    }

    #[tokio::test]
    async fn reload_inside_ttl_does_not_refetch() {
        let source = StubSource::new().with_markets(three_tokens());
        let mut service = service(source.clone());

        let first = run_analysis_pipeline(&mut service, &RsiConfig::default()).await;
        let second = run_analysis_pipeline(&mut service, &RsiConfig::default()).await;

        assert_eq!(first.table, second.table);
        assert_eq!(first.fetched_at, second.fetched_at);
        assert_eq!(source.calls(), vec!["markets"]);
    }

    #[tokio::test]
    async fn rsi_enrichment_covers_leading_rows_only() {
        let rising: Vec<f64> = (0..31).map(|d| 1.0 + d as f64).collect();
        let falling: Vec<f64> = (0..31).map(|d| 100.0 - d as f64).collect();
        let source = StubSource::new()
            .with_markets(three_tokens())
            .with_history("up", rising)
            .with_history("flat", falling);
        let mut service = service(source.clone());
        let rsi = RsiConfig {
            enabled: true,
            max_tokens: 2,
        };

        let dashboard = run_analysis_pipeline(&mut service, &rsi).await;
        let rows = &dashboard.table.rows;

        assert_eq!(rows[0].row.id, "up");
        assert_eq!(rows[0].rsi, Some(100.0));
        assert_eq!(rows[1].row.id, "flat");
        assert_eq!(rows[1].rsi, Some(0.0));
        assert_eq!(rows[2].rsi, None);
        assert_eq!(source.calls(), vec!["markets", "history:up", "history:flat"]);
    }

    #[tokio::test]
    async fn rsi_fetch_failure_becomes_notice() {
        let source = StubSource::new().with_markets(three_tokens());
        let mut service = service(source);
        let rsi = RsiConfig {
            enabled: true,
            max_tokens: 1,
        };

        let dashboard = run_analysis_pipeline(&mut service, &rsi).await;

        assert_eq!(dashboard.table.len(), 3);
        assert_eq!(dashboard.table.rows[0].rsi, None);
        assert_eq!(dashboard.notices, vec!["Error fetching data for up: upstream returned 404: coin not found"]);
    }

    #[tokio::test]
    async fn rsi_does_not_change_ranking() {
        let source = StubSource::new()
            .with_markets(three_tokens())
            .with_history("down", (0..31).map(|d| 1.0 + d as f64).collect());
        let mut plain = service(source.clone());
        let mut enriched = service(source);

        let without = run_analysis_pipeline(&mut plain, &RsiConfig::default()).await;
        let with = run_analysis_pipeline(
            &mut enriched,
            &RsiConfig {
                enabled: true,
                max_tokens: 3,
            },
        )
        .await;

        let order = |d: &Dashboard| d.table.rows.iter().map(|r| (r.row.id.clone(), r.score)).collect::<Vec<_>>();
        assert_eq!(order(&without), order(&with));
    }
}
