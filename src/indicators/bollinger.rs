use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands over the last `period` prices
///
/// Mean ± `std_dev_multiplier` × population standard deviation.
pub fn calculate_bollinger_bands(
    prices: &[f64],
    period: usize,
    std_dev_multiplier: f64,
) -> Option<BollingerBands> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let std_dev = population_std_dev(&prices[prices.len() - period..]);
    let mean = prices[prices.len() - period..].iter().sum::<f64>() / period as f64;

    Some(BollingerBands {
        upper: mean + std_dev_multiplier * std_dev,
        middle: mean,
        lower: mean - std_dev_multiplier * std_dev,
    })
}

pub(crate) fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_known_values() {
        // Mean 5, population std dev 2
        let prices = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bb = calculate_bollinger_bands(&prices, 8, 2.0).unwrap();

        assert!((bb.middle - 5.0).abs() < 1e-9);
        assert!((bb.upper - 9.0).abs() < 1e-9);
        assert!((bb.lower - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_uses_last_period_prices() {
        let prices = vec![1000.0, 10.0, 10.0, 10.0];
        let bb = calculate_bollinger_bands(&prices, 3, 2.0).unwrap();
        assert_eq!(bb.middle, 10.0);
        assert_eq!(bb.upper, 10.0);
        assert_eq!(bb.lower, 10.0);
    }

    #[test]
    fn test_bollinger_insufficient_data() {
        assert!(calculate_bollinger_bands(&[1.0, 2.0], 3, 2.0).is_none());
    }
}
