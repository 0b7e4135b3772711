use crate::market_data::{MarketSnapshotRow, PriceSeries};
use ta::Next;
use ta::indicators::SimpleMovingAverage;

pub const RSI_PERIOD: usize = 14;

/// Per-row indicators. `None` means the inputs were missing or a
/// denominator was zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    /// total volume / market cap
    pub volume_trend: Option<f64>,
    /// 7d change / 7, a rough average daily change in percent
    pub momentum: Option<f64>,
    /// (price - 24h high) / price, normally <= 0
    pub high_distance: Option<f64>,
}

impl DerivedMetrics {
    pub fn from_row(row: &MarketSnapshotRow) -> Self {
        Self {
            volume_trend: ratio(row.total_volume, row.market_cap),
            momentum: ratio(row.change_7d, Some(7.0)),
            high_distance: row
                .current_price
                .zip(row.high_24h)
                .and_then(|(price, high)| ratio(Some(price - high), Some(price))),
        }
    }
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = numerator.zip(denominator)?;
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|v| v.is_finite())
}

/// Latest 14-period RSI of the series, using simple rolling means of gains
/// and losses.
pub fn calculate_rsi(series: &PriceSeries) -> Option<f64> {
    rsi_from_prices(&series.prices(), RSI_PERIOD)
}

/// RSI over the last `period` price differences. The first price has no
/// predecessor and counts as a zero difference, so `period` prices are
/// enough for a value.
///
/// A window with losses but no gains is 0, gains but no losses is 100, and a
/// flat window has no defined value.
pub fn rsi_from_prices(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || prices.len() < period {
        return None;
    }
    let mut avg_gain = SimpleMovingAverage::new(period).ok()?;
    let mut avg_loss = SimpleMovingAverage::new(period).ok()?;

    let deltas = std::iter::once(0.0).chain(prices.windows(2).map(|pair| pair[1] - pair[0]));
    let mut last = (0.0, 0.0);
    for delta in deltas {
        last = (
            avg_gain.next(delta.max(0.0)),
            avg_loss.next((-delta).max(0.0)),
        );
    }

    match last {
        (gain, loss) if !gain.is_finite() || !loss.is_finite() => None,
        (gain, loss) if loss <= 0.0 && gain <= 0.0 => None,
        (_, loss) if loss <= 0.0 => Some(100.0),
        (gain, loss) => {
            let rs = gain / loss;
            Some(100.0 - 100.0 / (1.0 + rs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::tests::row;
    use approx::assert_relative_eq;

    #[test]
    fn derives_metrics_from_row() {
        let mut r = row("bitcoin");
        r.total_volume = Some(2_000.0);
        r.market_cap = Some(8_000.0);
        r.change_7d = Some(14.0);
        r.current_price = Some(100.0);
        r.high_24h = Some(110.0);

        let m = DerivedMetrics::from_row(&r);

        assert_relative_eq!(m.volume_trend.unwrap(), 0.25);
        assert_relative_eq!(m.momentum.unwrap(), 2.0);
        assert_relative_eq!(m.high_distance.unwrap(), -0.1);
    }

    #[test]
    fn price_above_recorded_high_is_positive_distance() {
        let mut r = row("skewed");
        r.current_price = Some(105.0);
        r.high_24h = Some(100.0);
        assert!(DerivedMetrics::from_row(&r).high_distance.unwrap() > 0.0);
    }

    #[test]
    fn zero_denominators_are_undefined() {
        let mut r = row("dead-coin");
        r.market_cap = Some(0.0);
        r.current_price = Some(0.0);

        let m = DerivedMetrics::from_row(&r);

        assert_eq!(m.volume_trend, None);
        assert_eq!(m.high_distance, None);
        assert!(m.momentum.is_some());
    }

    #[test]
    fn missing_inputs_are_undefined() {
        let mut r = row("illiquid");
        r.change_7d = None;
        r.high_24h = None;
        r.total_volume = None;

        assert_eq!(DerivedMetrics::from_row(&r), DerivedMetrics::default());
    }

    #[test]
    fn rsi_needs_period_prices() {
        let prices: Vec<f64> = (1..=14).map(f64::from).collect();
        assert_eq!(rsi_from_prices(&prices, 14), Some(100.0));
        assert_eq!(rsi_from_prices(&prices[..13], 14), None);
        assert_eq!(rsi_from_prices(&[], 14), None);
    }

    #[test]
    fn first_price_counts_as_flat_step() {
        // 13 moves (7 up, 6 down) plus the zero step before the first price.
        let prices: Vec<f64> = (0..14).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let expected = 100.0 - 100.0 / (1.0 + 7.0 / 6.0);
        assert_relative_eq!(rsi_from_prices(&prices, 14).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn rsi_of_rising_series_is_100() {
        let prices: Vec<f64> = (0..30).map(|i| 10.0 + 0.5 * i as f64).collect();
        assert_eq!(rsi_from_prices(&prices, 14), Some(100.0));
    }

    #[test]
    fn rsi_of_falling_series_is_0() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - 1.5 * i as f64).collect();
        assert_eq!(rsi_from_prices(&prices, 14), Some(0.0));
    }

    #[test]
    fn rsi_of_balanced_series_is_50() {
        let prices: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        assert_relative_eq!(rsi_from_prices(&prices, 14).unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn rsi_uses_only_the_trailing_window() {
        // Early crash, then 14 straight gains.
        let mut prices = vec![100.0, 50.0, 20.0];
        prices.extend((0..14).map(|i| 21.0 + i as f64));
        assert_eq!(rsi_from_prices(&prices, 14), Some(100.0));
    }

    #[test]
    fn rsi_of_flat_series_is_undefined() {
        assert_eq!(rsi_from_prices(&[5.0; 20], 14), None);
    }

    #[test]
    fn rsi_from_price_series() {
        let raw: Vec<[f64; 2]> = (0..31)
            .map(|d| [1_700_000_000_000.0 + d as f64 * 86_400_000.0, 1.0 + d as f64])
            .collect();
        let series = PriceSeries::from_raw("solana", &raw);
        assert_eq!(calculate_rsi(&series), Some(100.0));
    }
}
