use super::moving_average::Ema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// MACD line and its signal line for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
}

impl MacdValue {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

/// Per-instrument MACD state carried between ticks
///
/// Holds the short/long EMA pair, a bounded history of recent MACD values
/// (capacity = signal period) and the signal-line EMA over that history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdState {
    ema_short: Ema,
    ema_long: Ema,
    history: VecDeque<f64>,
    signal: Ema,
}

impl MacdState {
    pub fn new(short_period: usize, long_period: usize, signal_period: usize) -> Self {
        Self {
            ema_short: Ema::new(short_period),
            ema_long: Ema::new(long_period),
            history: VecDeque::with_capacity(signal_period),
            signal: Ema::new(signal_period),
        }
    }

    pub fn ema_short(&self) -> Option<f64> {
        self.ema_short.value()
    }

    pub fn ema_long(&self) -> Option<f64> {
        self.ema_long.value()
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    /// Advance one tick with the main window's price series
    ///
    /// Nothing is updated until the series holds at least the long-EMA period;
    /// after that the signal line needs `signal_period` ticks of MACD history.
    pub fn update(&mut self, prices: &[f64]) -> Option<MacdValue> {
        if prices.len() < self.ema_long.period() {
            return None;
        }

        let short = self.ema_short.update(prices)?;
        let long = self.ema_long.update(prices)?;
        let macd = short - long;

        self.history.push_back(macd);
        while self.history.len() > self.signal.period() {
            self.history.pop_front();
        }

        let signal = self.signal.update(self.history.make_contiguous())?;

        Some(MacdValue { macd, signal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_macd_requires_long_period_samples() {
        let mut state = MacdState::new(2, 4, 3);
        assert_eq!(state.update(&rising(3)), None);
        assert_eq!(state.ema_short(), None);
        assert_eq!(state.ema_long(), None);
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_macd_signal_needs_history() {
        let mut state = MacdState::new(2, 4, 3);
        let prices = rising(10);

        // Two ticks of MACD history are not enough for a 3-period signal line
        assert_eq!(state.update(&prices[..4]), None);
        assert_eq!(state.update(&prices[..5]), None);
        assert_eq!(state.history().len(), 2);

        let value = state.update(&prices[..6]).unwrap();
        assert_eq!(state.history().len(), 3);
        let mean: f64 = state.history().iter().sum::<f64>() / 3.0;
        assert!((value.signal - mean).abs() < 1e-9);
    }

    #[test]
    fn test_macd_history_is_bounded() {
        let mut state = MacdState::new(2, 4, 3);
        let prices = rising(20);
        for t in 4..=prices.len() {
            state.update(&prices[..t]);
        }
        assert_eq!(state.history().len(), 3);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let mut state = MacdState::new(3, 6, 3);
        let prices = rising(30);
        let mut last = None;
        for t in 6..=prices.len() {
            if let Some(v) = state.update(&prices[..t]) {
                last = Some(v);
            }
        }

        let value = last.unwrap();
        assert!(value.macd > 0.0);
    }

    #[test]
    fn test_macd_line_is_ema_difference() {
        let mut state = MacdState::new(2, 3, 1);
        let value = state.update(&[1.0, 2.0, 3.0]).unwrap();

        // Short seed = 2.5, long seed = 2.0; signal over one value equals it
        assert!((value.macd - 0.5).abs() < 1e-9);
        assert!((value.signal - 0.5).abs() < 1e-9);
        assert!(value.histogram().abs() < 1e-9);
    }
}
