use serde::{Deserialize, Serialize};

/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA) over a full series
///
/// Seeds with the SMA of the first `period` prices and folds the rest in.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = ema_multiplier(period);

    // Start with SMA
    let initial_sma = calculate_sma(&prices[0..period], period)?;

    let mut ema = initial_sma;
    for price in &prices[period..] {
        ema = price * multiplier + ema * (1.0 - multiplier);
    }

    Some(ema)
}

fn ema_multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// EMA carried forward tick over tick
///
/// The first update with at least `period` samples seeds the average from the
/// most recent `period` samples; every later update folds in only the newest
/// sample. The seed is anchored at that first tick, so rebuilding from a
/// fresh window each tick would give different values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ema {
    period: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Advance with the current sample series (oldest first)
    pub fn update(&mut self, samples: &[f64]) -> Option<f64> {
        let next = match self.value {
            None => calculate_sma(samples, self.period),
            Some(prev) => {
                let k = ema_multiplier(self.period);
                samples.last().map(|latest| latest * k + prev * (1.0 - k))
            }
        };

        if next.is_some() {
            self.value = next;
        }
        next
    }
}
