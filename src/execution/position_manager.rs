use crate::models::Signal;
use crate::settings::RiskSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Stop distance is this many ATRs from entry
pub const ATR_STOP_MULTIPLIER: f64 = 2.0;

/// Take-profit offset per unit of take-profit ratio, as a fraction of entry
pub const TAKE_PROFIT_STEP: f64 = 0.05;

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position already open for {0}")]
    AlreadyOpen(String),

    #[error("cannot open {0}: {1} is not a usable direction")]
    InvalidDirection(String, Signal),

    #[error("cannot size {0}: invalid stop distance {1}")]
    InvalidStopDistance(String, f64),

    #[error("cannot open {0}: computed size is zero")]
    ZeroSize(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Reversal,
    Manual,
}

/// Synthetic position opened on a confirmed signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub direction: Signal,
    pub entry_price: f64,
    pub position_size: f64,
    /// Highest price since entry for LONG, lowest for SHORT
    pub best_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// Fixed offset the stop keeps from `best_price`
    pub stop_distance: f64,
    pub signal_confidence: f64,
    pub opened_at: i64,
}

impl Position {
    /// P&L if closed at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.direction {
            Signal::Short => (self.entry_price - price) * self.position_size,
            _ => (price - self.entry_price) * self.position_size,
        }
    }

    fn trail(&mut self, price: f64) -> bool {
        match self.direction {
            Signal::Long if price > self.best_price => {
                self.best_price = price;
                self.stop_loss_price = price - self.stop_distance;
                true
            }
            Signal::Short if price < self.best_price => {
                self.best_price = price;
                self.stop_loss_price = price + self.stop_distance;
                true
            }
            _ => false,
        }
    }

    fn exit_reason(&self, price: f64) -> Option<ExitReason> {
        let (stopped, target_hit) = match self.direction {
            Signal::Short => (price >= self.stop_loss_price, price <= self.take_profit_price),
            _ => (price <= self.stop_loss_price, price >= self.take_profit_price),
        };

        if stopped {
            Some(ExitReason::StopLoss)
        } else if target_hit {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub closed_at: i64,
    pub realized_pnl: f64,
}

/// Holds at most one open position per instrument
pub struct PositionManager {
    open: HashMap<String, Position>,
    closed_count: usize,
    portfolio_balance: f64,
    max_portfolio_risk: f64,
    take_profit_ratio: f64,
    total_pnl: f64,
}

impl PositionManager {
    pub fn new(risk: &RiskSettings) -> Self {
        Self {
            open: HashMap::new(),
            closed_count: 0,
            portfolio_balance: risk.portfolio_balance,
            max_portfolio_risk: risk.max_portfolio_risk,
            take_profit_ratio: risk.take_profit_ratio,
            total_pnl: 0.0,
        }
    }

    /// Open a position sized from the ATR-derived stop distance
    ///
    /// The caller only opens on a freshly confirmed directional signal.
    pub fn open(
        &mut self,
        instrument: &str,
        direction: Signal,
        entry_price: f64,
        confidence: f64,
        atr: f64,
        now: i64,
    ) -> Result<&Position, PositionError> {
        if self.open.contains_key(instrument) {
            return Err(PositionError::AlreadyOpen(instrument.to_string()));
        }
        if !direction.is_directional() {
            return Err(PositionError::InvalidDirection(
                instrument.to_string(),
                direction,
            ));
        }

        let stop_distance = atr * ATR_STOP_MULTIPLIER;
        if !stop_distance.is_finite() || stop_distance <= 0.0 {
            return Err(PositionError::InvalidStopDistance(
                instrument.to_string(),
                stop_distance,
            ));
        }

        let position_size =
            (self.portfolio_balance * self.max_portfolio_risk / stop_distance).floor();
        if position_size <= 0.0 {
            return Err(PositionError::ZeroSize(instrument.to_string()));
        }

        let target_offset = self.take_profit_ratio * TAKE_PROFIT_STEP;
        let (stop_loss_price, take_profit_price) = match direction {
            Signal::Short => (
                entry_price + stop_distance,
                entry_price * (1.0 - target_offset),
            ),
            _ => (
                entry_price - stop_distance,
                entry_price * (1.0 + target_offset),
            ),
        };

        let position = Position {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            direction,
            entry_price,
            position_size,
            best_price: entry_price,
            stop_loss_price,
            take_profit_price,
            stop_distance,
            signal_confidence: confidence,
            opened_at: now,
        };

        tracing::info!(
            "📈 Opened {} {} @ ${:.4} (size: {}, stop: ${:.4}, target: ${:.4})",
            direction,
            instrument,
            entry_price,
            position_size,
            stop_loss_price,
            take_profit_price
        );

        Ok(self.open.entry(instrument.to_string()).or_insert(position))
    }

    /// Feed a new price; trails the stop and closes on stop or target
    pub fn update_price(&mut self, instrument: &str, price: f64, now: i64) -> Option<ClosedPosition> {
        let position = self.open.get_mut(instrument)?;

        if position.trail(price) {
            tracing::debug!(
                "Trailing stop for {} moved to ${:.4}",
                instrument,
                position.stop_loss_price
            );
        }

        let reason = position.exit_reason(price)?;
        self.close(instrument, price, reason, now)
    }

    /// Remove an open position; a second call is a no-op returning `None`
    pub fn close(
        &mut self,
        instrument: &str,
        exit_price: f64,
        reason: ExitReason,
        now: i64,
    ) -> Option<ClosedPosition> {
        let position = self.open.remove(instrument)?;
        let realized_pnl = position.pnl_at(exit_price);
        self.total_pnl += realized_pnl;
        self.closed_count += 1;

        tracing::info!(
            "📉 Closed {} {} @ ${:.4} ({:?}, P&L: ${:.2})",
            position.direction,
            instrument,
            exit_price,
            reason,
            realized_pnl
        );

        Some(ClosedPosition {
            position,
            exit_price,
            exit_reason: reason,
            closed_at: now,
            realized_pnl,
        })
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.open.get(instrument)
    }

    pub fn has_position(&self, instrument: &str) -> bool {
        self.open.contains_key(instrument)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    /// Closed positions are handed to the caller, only the count is kept
    pub fn closed_count(&self) -> usize {
        self.closed_count
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }
}
