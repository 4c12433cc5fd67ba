// Technical indicators module
// Implements RSI, EMA/MACD, Bollinger Bands, ATR and a volatility proxy

pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use atr::{calculate_atr, calculate_volatility_proxy};
pub use bollinger::{calculate_bollinger_bands, BollingerBands};
pub use macd::{MacdState, MacdValue};
pub use moving_average::{calculate_ema, calculate_sma, Ema};
pub use rsi::calculate_rsi;

use crate::settings::Settings;
use serde::{Deserialize, Serialize};

/// Carried-forward indicator state for one instrument
///
/// Lives for the whole process; a fresh state is injected per instrument the
/// first time it is seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorState {
    pub macd: MacdState,
}

impl IndicatorState {
    pub fn new(settings: &Settings) -> Self {
        let ind = &settings.indicators;
        Self {
            macd: MacdState::new(
                ind.ema_short_period,
                ind.ema_long_period,
                ind.macd_signal_period,
            ),
        }
    }
}

/// Price series of each configured window, taken from one tick snapshot
#[derive(Debug, Clone, Default)]
pub struct WindowPrices {
    pub short: Vec<f64>,
    pub main: Vec<f64>,
    pub long: Vec<f64>,
    pub extended: Vec<f64>,
    pub ultra_long: Vec<f64>,
}

/// Everything the indicator engine produced for one instrument this tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub rsi_short: Option<f64>,
    pub rsi_main: Option<f64>,
    pub rsi_long: Option<f64>,
    pub rsi_extended: Option<f64>,
    pub rsi_ultra_long: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerBands>,
    pub atr: Option<f64>,
    pub volatility: Option<f64>,
}

/// Run every indicator for one instrument over its window slices
///
/// RSI is a fresh computation per window; only the MACD state advances.
pub fn compute_indicators(
    windows: &WindowPrices,
    state: &mut IndicatorState,
    settings: &Settings,
) -> IndicatorSet {
    let periods = &settings.rsi_periods;
    let ind = &settings.indicators;

    IndicatorSet {
        rsi_short: calculate_rsi(&windows.short, periods.short),
        rsi_main: calculate_rsi(&windows.main, periods.main),
        rsi_long: calculate_rsi(&windows.long, periods.long),
        rsi_extended: calculate_rsi(&windows.extended, periods.extended),
        rsi_ultra_long: calculate_rsi(&windows.ultra_long, periods.ultra_long),
        macd: state.macd.update(&windows.main),
        bollinger: calculate_bollinger_bands(&windows.main, ind.bb_period, ind.bb_std_dev),
        atr: calculate_atr(&windows.main, ind.volatility_lookback),
        volatility: calculate_volatility_proxy(&windows.main, ind.volatility_lookback),
    }
}
