use crate::models::{OrderClass, Signal, Trade, TradeSide};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Confidence given to a signal freshly forced by whale flow
pub const WHALE_OVERRIDE_CONFIDENCE: f64 = 0.5;

/// Confidence added when whale flow agrees with the current signal
pub const WHALE_CONFIDENCE_BOOST: f64 = 0.2;

/// Per-instrument signal state
///
/// `current_signal` is the raw, possibly noisy call; `confirmed_signal` only
/// changes to a direction after the persistence and cooldown gates.
///
/// Invariant after every scoring pass: a NEUTRAL confirmed signal has
/// `signal_start_timestamp == 0` and `last_confidence == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalState {
    pub current_signal: Signal,
    pub confirmed_signal: Signal,
    pub last_change_timestamp: i64,
    pub last_confirmed_timestamp: i64,
    pub signal_start_timestamp: i64,
    pub last_confidence: f64,
    pub last_alerted_signal: Option<Signal>,
}

impl SignalState {
    pub fn new(now: i64) -> Self {
        Self {
            current_signal: Signal::Neutral,
            confirmed_signal: Signal::Neutral,
            last_change_timestamp: now,
            last_confirmed_timestamp: 0,
            signal_start_timestamp: 0,
            last_confidence: 0.0,
            last_alerted_signal: None,
        }
    }

    /// Whole seconds the confirmed signal has been held, 0 when NEUTRAL
    pub fn duration_secs(&self, now: i64) -> i64 {
        if self.signal_start_timestamp == 0 {
            0
        } else {
            (now - self.signal_start_timestamp).max(0) / 1000
        }
    }
}

/// Outcome of one scoring pass for one instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalUpdate {
    pub previous_confirmed: Signal,
    pub confirmed: Signal,
    pub confidence: f64,
    /// True only on the tick a directional signal was promoted
    pub newly_confirmed: bool,
}

impl SignalUpdate {
    pub fn changed(&self) -> bool {
        self.previous_confirmed != self.confirmed
    }
}

/// Persistence-then-cooldown confirmation state machine for every instrument
#[derive(Debug, Clone)]
pub struct SignalEngine {
    states: HashMap<String, SignalState>,
    persistence_ms: i64,
    cooldown_ms: i64,
    whale_lookback_ms: i64,
}

impl SignalEngine {
    pub fn new(persistence_ms: i64, cooldown_ms: i64, whale_lookback_ms: i64) -> Self {
        Self {
            states: HashMap::new(),
            persistence_ms,
            cooldown_ms,
            whale_lookback_ms,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.signal.persistence_ms,
            settings.signal.cooldown_ms,
            settings.signal.whale_lookback_ms,
        )
    }

    /// Replace all state, e.g. from a persisted snapshot
    pub fn restore(&mut self, states: HashMap<String, SignalState>) {
        tracing::info!("Restored signal state for {} instruments", states.len());
        self.states = states;
    }

    pub fn state(&self, instrument: &str) -> Option<&SignalState> {
        self.states.get(instrument)
    }

    pub fn states(&self) -> &HashMap<String, SignalState> {
        &self.states
    }

    fn state_mut(&mut self, instrument: &str, now: i64) -> &mut SignalState {
        self.states
            .entry(instrument.to_string())
            .or_insert_with(|| SignalState::new(now))
    }

    /// Feed one freshly scored signal through the state machine
    pub fn evaluate(
        &mut self,
        instrument: &str,
        new_signal: Signal,
        confidence: f64,
        now: i64,
    ) -> SignalUpdate {
        let persistence_ms = self.persistence_ms;
        let cooldown_ms = self.cooldown_ms;
        let state = self.state_mut(instrument, now);
        let previous_confirmed = state.confirmed_signal;

        if new_signal != state.current_signal {
            state.current_signal = new_signal;
            state.last_change_timestamp = now;
        }
        state.last_confidence = confidence;

        let stable_for = now - state.last_change_timestamp;
        let since_confirmation = now - state.last_confirmed_timestamp;

        let mut newly_confirmed = false;
        if new_signal != state.confirmed_signal
            && new_signal.is_directional()
            && stable_for >= persistence_ms
            && since_confirmation >= cooldown_ms
        {
            state.confirmed_signal = new_signal;
            state.last_confirmed_timestamp = now;
            state.signal_start_timestamp = now;
            newly_confirmed = true;

            tracing::info!(
                symbol = %instrument,
                signal = %new_signal,
                confidence = format!("{:.2}", confidence),
                "Signal confirmed"
            );
        }

        // Leaving a direction is immediate once the raw score stops qualifying
        if state.confirmed_signal.is_directional() && !new_signal.is_directional() {
            state.confirmed_signal = Signal::Neutral;
        }

        if state.confirmed_signal == Signal::Neutral {
            state.signal_start_timestamp = 0;
            state.last_confidence = 0.0;
        } else if state.signal_start_timestamp == 0 {
            state.signal_start_timestamp = now;
        }

        SignalUpdate {
            previous_confirmed,
            confirmed: state.confirmed_signal,
            confidence: state.last_confidence,
            newly_confirmed,
        }
    }

    /// Force the raw signal toward recent whale flow
    ///
    /// Sums WHALE-classified volume per side within the whale look-back. Buy
    /// volume above `threshold` forces LONG, otherwise sell volume above it
    /// forces SHORT. Agreement boosts this tick's scored confidence, never
    /// below the override floor; a change restarts the persistence clock. The
    /// confirmation gates are untouched.
    pub fn apply_whale_override(
        &mut self,
        instrument: &str,
        trades: &[Trade],
        threshold: f64,
        scored_confidence: f64,
        now: i64,
    ) -> Option<Signal> {
        let lookback = self.whale_lookback_ms;
        let (buy_volume, sell_volume) = trades
            .iter()
            .filter(|t| t.classification == OrderClass::Whale && now - t.timestamp < lookback)
            .fold((0.0, 0.0), |(buy, sell), t| match t.side {
                TradeSide::Buy => (buy + t.quantity, sell),
                TradeSide::Sell => (buy, sell + t.quantity),
            });

        let forced = if buy_volume > threshold {
            Signal::Long
        } else if sell_volume > threshold {
            Signal::Short
        } else {
            return None;
        };

        let state = self.state_mut(instrument, now);
        if state.current_signal == forced {
            // A still-NEUTRAL confirmed signal has had its stored confidence zeroed
            let base = state.last_confidence.max(scored_confidence);
            state.last_confidence = (base + WHALE_CONFIDENCE_BOOST)
                .min(1.0)
                .max(WHALE_OVERRIDE_CONFIDENCE);
        } else {
            state.current_signal = forced;
            state.last_change_timestamp = now;
            state.last_confidence = WHALE_OVERRIDE_CONFIDENCE;
        }

        tracing::debug!(
            symbol = %instrument,
            signal = %forced,
            buy_volume,
            sell_volume,
            "Whale override applied"
        );

        Some(forced)
    }

    /// Record that the confirmed signal has been seen by the alert path
    ///
    /// Returns the signal to alert on when the confirmed signal differs from
    /// the last one alerted and is directional.
    pub fn take_alert(&mut self, instrument: &str) -> Option<Signal> {
        let state = self.states.get_mut(instrument)?;
        if state.last_alerted_signal == Some(state.confirmed_signal) {
            return None;
        }

        state.last_alerted_signal = Some(state.confirmed_signal);
        state
            .confirmed_signal
            .is_directional()
            .then_some(state.confirmed_signal)
    }
}
