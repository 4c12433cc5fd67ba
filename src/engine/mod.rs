// Tick orchestrator: snapshot -> indicators -> signals -> positions -> publish
use crate::events::{InstrumentSummary, MarketEvent};
use crate::execution::{BufferSnapshot, ClosedPosition, ExitReason, Position, PositionManager};
use crate::indicators::{compute_indicators, IndicatorState, WindowPrices};
use crate::models::{Enrichment, OrderClass, Signal, Trade, TradeSide};
use crate::notify::SignalAlert;
use crate::settings::Settings;
use crate::strategy::{decide, score, ScoringConfig, SignalEngine, SignalInputs, SignalState};
use std::collections::HashMap;
use std::sync::Arc;

/// Last two distinct open-interest readings for one instrument
#[derive(Debug, Clone, Copy, Default)]
struct OpenInterestTracker {
    latest: Option<f64>,
    previous: Option<f64>,
}

impl OpenInterestTracker {
    fn observe(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            if self.latest != Some(v) {
                self.previous = self.latest;
                self.latest = Some(v);
            }
        }
    }

    fn trend(&self) -> Option<f64> {
        Some(self.latest? - self.previous?)
    }
}

/// Buy, sell and net volume of a set of trades
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Volume {
    pub buy: f64,
    pub sell: f64,
}

impl Volume {
    pub fn of(trades: &[Trade]) -> Self {
        trades.iter().fold(Self::default(), |mut v, t| {
            match t.side {
                TradeSide::Buy => v.buy += t.quantity,
                TradeSide::Sell => v.sell += t.quantity,
            }
            v
        })
    }

    pub fn net(&self) -> f64 {
        self.buy - self.sell
    }
}

/// Everything one tick produced, ready to publish
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub timestamp: i64,
    pub summaries: Vec<InstrumentSummary>,
    pub alerts: Vec<SignalAlert>,
    pub opened: Vec<Position>,
    pub closed: Vec<ClosedPosition>,
}

impl TickOutcome {
    pub fn events(&self) -> Vec<MarketEvent> {
        let mut events: Vec<MarketEvent> = self
            .closed
            .iter()
            .map(|c| MarketEvent::PositionClosed {
                closed: Box::new(c.clone()),
            })
            .collect();
        events.extend(self.opened.iter().map(|p| MarketEvent::PositionOpened {
            position: Box::new(p.clone()),
        }));
        events.push(MarketEvent::Summary {
            timestamp: self.timestamp,
            instruments: self.summaries.clone(),
        });
        events
    }
}

/// Single owner of indicator, signal and position state
///
/// `run_tick` is synchronous and works only on the snapshot and enrichment it
/// is handed, so every instrument in one tick sees one consistent view.
pub struct Engine {
    settings: Arc<Settings>,
    indicator_states: HashMap<String, IndicatorState>,
    signals: SignalEngine,
    positions: PositionManager,
    open_interest: HashMap<String, OpenInterestTracker>,
}

impl Engine {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            signals: SignalEngine::from_settings(&settings),
            positions: PositionManager::new(&settings.risk),
            indicator_states: HashMap::new(),
            open_interest: HashMap::new(),
            settings,
        }
    }

    pub fn restore(
        &mut self,
        signal_states: HashMap<String, SignalState>,
        indicator_states: HashMap<String, IndicatorState>,
    ) {
        self.signals.restore(signal_states);
        self.indicator_states = indicator_states;
    }

    pub fn signal_states(&self) -> &HashMap<String, SignalState> {
        self.signals.states()
    }

    pub fn indicator_states(&self) -> &HashMap<String, IndicatorState> {
        &self.indicator_states
    }

    pub fn signal_state(&self, instrument: &str) -> Option<&SignalState> {
        self.signals.state(instrument)
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn run_tick(
        &mut self,
        snapshot: &BufferSnapshot,
        enrichment: &HashMap<String, Enrichment>,
        now: i64,
    ) -> TickOutcome {
        let mut outcome = TickOutcome {
            timestamp: now,
            ..TickOutcome::default()
        };

        let instruments = self.settings.instruments.clone();
        for instrument in &instruments {
            let market = enrichment.get(instrument).copied().unwrap_or_default();
            self.tick_instrument(instrument, snapshot, market, now, &mut outcome);
        }

        outcome
    }

    fn tick_instrument(
        &mut self,
        instrument: &str,
        snapshot: &BufferSnapshot,
        market: Enrichment,
        now: i64,
        outcome: &mut TickOutcome,
    ) {
        let windows = &self.settings.windows;
        let main_trades = snapshot.window(instrument, windows.main_ms);
        let Some(last_price) = main_trades.last().map(|t| t.price) else {
            // Nothing to score; still report whatever signal state is known
            if let Some(state) = self.signals.state(instrument) {
                outcome
                    .summaries
                    .push(InstrumentSummary::signal_only(instrument, state, now));
            }
            return;
        };

        let prices = WindowPrices {
            short: snapshot.prices(instrument, windows.short_ms),
            main: main_trades.iter().map(|t| t.price).collect(),
            long: snapshot.prices(instrument, windows.long_ms),
            extended: snapshot.prices(instrument, windows.extended_ms),
            ultra_long: snapshot.prices(instrument, windows.ultra_long_ms),
        };
        let volume = Volume::of(&main_trades);

        let state = self
            .indicator_states
            .entry(instrument.to_string())
            .or_insert_with(|| IndicatorState::new(&self.settings));
        let indicators = compute_indicators(&prices, state, &self.settings);

        let oi = self.open_interest.entry(instrument.to_string()).or_default();
        oi.observe(market.open_interest);

        let inputs = SignalInputs::from_indicators(
            &indicators,
            last_price,
            volume.net(),
            market.funding_rate,
            oi.trend(),
        );
        let (raw_signal, confidence) = decide(score(
            &inputs,
            &ScoringConfig::for_instrument(&self.settings, instrument),
        ));
        let update = self.signals.evaluate(instrument, raw_signal, confidence, now);
        if update.changed() && !update.confirmed.is_directional() {
            tracing::info!(
                symbol = %instrument,
                "Signal {} released to NEUTRAL",
                update.previous_confirmed
            );
        }

        self.signals.apply_whale_override(
            instrument,
            snapshot.trades(instrument),
            self.settings.large_trade_threshold(instrument),
            confidence,
            now,
        );

        if let Some(closed) = self.positions.update_price(instrument, last_price, now) {
            outcome.closed.push(closed);
        }

        let reversed = match self.positions.position(instrument) {
            Some(p) => {
                update.confirmed.is_directional() && p.direction == update.confirmed.opposite()
            }
            None => false,
        };
        if reversed {
            if let Some(closed) = self
                .positions
                .close(instrument, last_price, ExitReason::Reversal, now)
            {
                outcome.closed.push(closed);
            }
        } else if update.newly_confirmed
            && update.confidence >= self.settings.risk.min_open_confidence
        {
            self.try_open(
                instrument,
                update.confirmed,
                last_price,
                update.confidence,
                indicators.atr,
                now,
                outcome,
            );
        }

        if let Some(signal) = self.signals.take_alert(instrument) {
            let duration_secs = self
                .signals
                .state(instrument)
                .map(|s| s.duration_secs(now))
                .unwrap_or(0);
            outcome.alerts.push(SignalAlert {
                instrument: instrument.to_string(),
                signal,
                confidence: update.confidence,
                price: last_price,
                net_volume: volume.net(),
                rsi: indicators.rsi_main,
                macd: indicators.macd,
                duration_secs,
            });
        }

        let state = self.signals.state(instrument);
        outcome.summaries.push(InstrumentSummary {
            instrument: instrument.to_string(),
            last_price: Some(last_price),
            buy_volume: volume.buy,
            sell_volume: volume.sell,
            net_volume: volume.net(),
            trade_count: main_trades.len(),
            large_trade_count: main_trades
                .iter()
                .filter(|t| t.classification != OrderClass::Retail)
                .count(),
            indicators,
            current_signal: state.map(|s| s.current_signal).unwrap_or_default(),
            confirmed_signal: update.confirmed,
            confidence: state.map(|s| s.last_confidence).unwrap_or(0.0),
            signal_duration_secs: state.map(|s| s.duration_secs(now)).unwrap_or(0),
            funding_rate: market.funding_rate,
            open_interest: market.open_interest,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn try_open(
        &mut self,
        instrument: &str,
        direction: Signal,
        price: f64,
        confidence: f64,
        atr: Option<f64>,
        now: i64,
        outcome: &mut TickOutcome,
    ) {
        let Some(atr) = atr.filter(|a| *a > 0.0) else {
            tracing::debug!("No usable ATR for {}, not opening", instrument);
            return;
        };

        match self
            .positions
            .open(instrument, direction, price, confidence, atr, now)
        {
            Ok(position) => outcome.opened.push(position.clone()),
            Err(e) => tracing::debug!("Not opening position: {}", e),
        }
    }
}
