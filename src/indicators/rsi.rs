/// Calculate Relative Strength Index (RSI)
///
/// Uses the last `period + 1` prices of the slice: sum of gains over sum of
/// losses across the last `period` price changes, then
/// `RSI = 100 - 100 / (1 + RS)`. Each call is an independent computation over
/// its own slice, nothing is carried between calls.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Returns 100 when there were no losses (including a flat series) and
/// rounds to two decimals.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let start = prices.len() - period;
    let (gains, losses) = (start..prices.len()).fold((0.0, 0.0), |(gains, losses), i| {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            (gains + change, losses)
        } else {
            (gains, losses - change)
        }
    });

    if losses == 0.0 {
        return Some(100.0);
    }

    let rs = gains / losses;
    let rsi = 100.0 - (100.0 / (1.0 + rs));

    Some((rsi * 100.0).round() / 100.0)
}
