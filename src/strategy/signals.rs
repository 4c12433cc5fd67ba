use crate::indicators::{BollingerBands, IndicatorSet, MacdValue};
use crate::models::Signal;
use crate::settings::Settings;

/// Minimum winning score before a direction is called
pub const MIN_DIRECTIONAL_SCORE: f64 = 2.0;

/// Score at which confidence saturates at 1.0
pub const FULL_CONFIDENCE_SCORE: f64 = 5.0;

const RSI_MAIN_WEIGHT: f64 = 1.0;
const RSI_SECONDARY_WEIGHT: f64 = 0.5;
const MACD_WEIGHT: f64 = 1.0;
const BOLLINGER_WEIGHT: f64 = 1.0;
const NET_VOLUME_WEIGHT: f64 = 0.5;
const FUNDING_WEIGHT: f64 = 0.3;
const OPEN_INTEREST_WEIGHT: f64 = 0.3;
const VOLATILITY_WEIGHT: f64 = 0.2;

/// Thresholds for signal scoring
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub net_volume_threshold: f64,
}

impl ScoringConfig {
    pub fn for_instrument(settings: &Settings, instrument: &str) -> Self {
        Self {
            rsi_oversold: settings.signal.rsi_oversold,
            rsi_overbought: settings.signal.rsi_overbought,
            net_volume_threshold: settings.net_volume_threshold(instrument),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            net_volume_threshold: 0.0,
        }
    }
}

/// Inputs to one scoring pass; any `None` contributes nothing to either side
#[derive(Debug, Clone, Default)]
pub struct SignalInputs {
    pub last_price: f64,
    pub net_volume: Option<f64>,
    pub rsi_short: Option<f64>,
    pub rsi_main: Option<f64>,
    pub rsi_long: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerBands>,
    pub funding_rate: Option<f64>,
    pub open_interest_trend: Option<f64>,
    pub volatility: Option<f64>,
}

impl SignalInputs {
    pub fn from_indicators(
        indicators: &IndicatorSet,
        last_price: f64,
        net_volume: f64,
        funding_rate: Option<f64>,
        open_interest_trend: Option<f64>,
    ) -> Self {
        Self {
            last_price,
            net_volume: Some(net_volume),
            rsi_short: indicators.rsi_short,
            rsi_main: indicators.rsi_main,
            rsi_long: indicators.rsi_long,
            macd: indicators.macd,
            bollinger: indicators.bollinger,
            funding_rate,
            open_interest_trend,
            volatility: indicators.volatility,
        }
    }
}

/// Long and short scores, computed independently so conflicts stay visible
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Score {
    pub long: f64,
    pub short: f64,
}

impl Score {
    fn add_directional(&mut self, long: bool, short: bool, weight: f64) {
        if long {
            self.long += weight;
        } else if short {
            self.short += weight;
        }
    }
}

/// Additive scoring across every available indicator
pub fn score(inputs: &SignalInputs, config: &ScoringConfig) -> Score {
    let mut score = Score::default();

    let rsi_weights = [
        (inputs.rsi_main, RSI_MAIN_WEIGHT),
        (inputs.rsi_short, RSI_SECONDARY_WEIGHT),
        (inputs.rsi_long, RSI_SECONDARY_WEIGHT),
    ];
    for (rsi, weight) in rsi_weights {
        if let Some(rsi) = rsi {
            score.add_directional(
                rsi < config.rsi_oversold,
                rsi > config.rsi_overbought,
                weight,
            );
        }
    }

    if let Some(macd) = inputs.macd {
        score.add_directional(macd.macd > macd.signal, macd.macd < macd.signal, MACD_WEIGHT);
    }

    if let Some(bb) = inputs.bollinger {
        score.add_directional(
            inputs.last_price < bb.lower,
            inputs.last_price > bb.upper,
            BOLLINGER_WEIGHT,
        );
    }

    if let Some(net_volume) = inputs.net_volume {
        score.add_directional(
            net_volume > config.net_volume_threshold,
            net_volume < -config.net_volume_threshold,
            NET_VOLUME_WEIGHT,
        );
    }

    if let Some(funding) = inputs.funding_rate {
        score.add_directional(funding > 0.0, funding < 0.0, FUNDING_WEIGHT);
    }

    if let Some(trend) = inputs.open_interest_trend {
        score.add_directional(trend > 0.0, trend < 0.0, OPEN_INTEREST_WEIGHT);
    }

    // Tie-breaker only: adds to both sides equally
    if inputs.volatility.is_some_and(|v| v > 0.0) {
        score.long += VOLATILITY_WEIGHT;
        score.short += VOLATILITY_WEIGHT;
    }

    score
}

/// Turn a score into a signal and a confidence in [0, 1]
pub fn decide(score: Score) -> (Signal, f64) {
    if score.long > score.short && score.long >= MIN_DIRECTIONAL_SCORE {
        (Signal::Long, confidence(score.long))
    } else if score.short > score.long && score.short >= MIN_DIRECTIONAL_SCORE {
        (Signal::Short, confidence(score.short))
    } else {
        (Signal::Neutral, 0.0)
    }
}

fn confidence(winning_score: f64) -> f64 {
    (winning_score / FULL_CONFIDENCE_SCORE).min(1.0)
}
