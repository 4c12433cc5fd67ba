/// Average True Range proxy for trade-level prices
///
/// The buffer holds individual trades, not OHLC bars, so every sample is a
/// bar with high = low = price. True Range then collapses to the absolute
/// change from the previous price:
///
/// TR = max(high - low, |high - prev|, |low - prev|) = |price - prev|
///
/// Returns the simple average of the last `period` true ranges, or None if
/// fewer than `period + 1` prices are available.
pub fn calculate_atr(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let start = prices.len() - period;
    let tr_sum: f64 = (start..prices.len())
        .map(|i| true_range(prices[i], prices[i - 1]))
        .sum();

    Some(tr_sum / period as f64)
}

fn true_range(price: f64, prev_close: f64) -> f64 {
    let (high, low) = (price, price);
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
        .max(0.0)
}

/// Rolling standard deviation of the last `lookback` prices
///
/// Only used as a confidence tie-breaker, never as a risk input.
pub fn calculate_volatility_proxy(prices: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || prices.len() < lookback {
        return None;
    }

    Some(super::bollinger::population_std_dev(
        &prices[prices.len() - lookback..],
    ))
}
