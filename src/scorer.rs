//! Blended strength score and ranking.

use std::cmp::Ordering;

use crate::indicators::DerivedMetrics;
use crate::market_data::MarketSnapshotRow;
use crate::normalize::{Normalized, min_max};

pub const WEIGHT_RETURN_7D: f64 = 0.35;
pub const WEIGHT_MOMENTUM: f64 = 0.25;
pub const WEIGHT_VOLUME_TREND: f64 = 0.20;
pub const WEIGHT_RETURN_14D: f64 = 0.20;

/// Blend order: 7d return, momentum, volume trend, 14d return.
pub const WEIGHTS: [f64; 4] = [
    WEIGHT_RETURN_7D,
    WEIGHT_MOMENTUM,
    WEIGHT_VOLUME_TREND,
    WEIGHT_RETURN_14D,
];

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub row: MarketSnapshotRow,
    pub metrics: DerivedMetrics,
    pub score: Option<f64>,
    pub rsi: Option<f64>,
}

/// Rows sorted by score, best first. Rows without a score trail the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedTable {
    pub rows: Vec<RankedRow>,
}

impl RankedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Weighted sum of normalized components. A `NoSignal` component adds
/// nothing; a `Missing` one leaves the score undefined.
pub fn blend(components: [Normalized; 4]) -> Option<f64> {
    components
        .iter()
        .zip(WEIGHTS)
        .try_fold(0.0, |acc, (component, weight)| match component {
            Normalized::Scaled(v) => Some(acc + weight * v),
            Normalized::NoSignal => Some(acc),
            Normalized::Missing => None,
        })
}

/// Scores every row against the rest of the snapshot and ranks them.
pub fn rank_snapshot(rows: &[MarketSnapshotRow]) -> RankedTable {
    let metrics: Vec<DerivedMetrics> = rows.iter().map(DerivedMetrics::from_row).collect();

    let return_7d = min_max(&rows.iter().map(|r| r.change_7d).collect::<Vec<_>>());
    let momentum = min_max(&metrics.iter().map(|m| m.momentum).collect::<Vec<_>>());
    let volume_trend = min_max(&metrics.iter().map(|m| m.volume_trend).collect::<Vec<_>>());
    let return_14d = min_max(&rows.iter().map(|r| r.change_14d).collect::<Vec<_>>());

    let mut ranked: Vec<RankedRow> = rows
        .iter()
        .zip(metrics)
        .enumerate()
        .map(|(i, (row, metrics))| RankedRow {
            row: row.clone(),
            metrics,
            score: blend([return_7d[i], momentum[i], volume_trend[i], return_14d[i]]),
            rsi: None,
        })
        .collect();

    // Stable, so equal scores keep snapshot (market cap) order.
    ranked.sort_by(|a, b| compare_scores(a.score, b.score));

    RankedTable { rows: ranked }
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
