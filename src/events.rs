//! Publish boundary
//!
//! Everything pushed to downstream consumers goes through [`Publisher`], a
//! `tokio::sync::broadcast` channel of JSON strings. Consumers that lag behind
//! lose the oldest events; publishing with no consumers is fine.

use crate::execution::{ClosedPosition, Position};
use crate::indicators::IndicatorSet;
use crate::models::{LargeTradeEvent, Signal};
use crate::strategy::SignalState;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Per-instrument view emitted with every tick
///
/// `last_price` is unset when the main window held no trades this tick; the
/// entry then only carries the signal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentSummary {
    pub instrument: String,
    pub last_price: Option<f64>,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub net_volume: f64,
    pub trade_count: usize,
    pub large_trade_count: usize,
    pub indicators: IndicatorSet,
    pub current_signal: Signal,
    pub confirmed_signal: Signal,
    pub confidence: f64,
    pub signal_duration_secs: i64,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
}

impl InstrumentSummary {
    /// Entry for an instrument with known signal state but an empty window
    pub fn signal_only(instrument: &str, state: &SignalState, now: i64) -> Self {
        Self {
            instrument: instrument.to_string(),
            last_price: None,
            buy_volume: 0.0,
            sell_volume: 0.0,
            net_volume: 0.0,
            trade_count: 0,
            large_trade_count: 0,
            indicators: IndicatorSet::default(),
            current_signal: state.current_signal,
            confirmed_signal: state.confirmed_signal,
            confidence: state.last_confidence,
            signal_duration_secs: state.duration_secs(now),
            funding_rate: None,
            open_interest: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketEvent {
    Summary {
        timestamp: i64,
        instruments: Vec<InstrumentSummary>,
    },
    LargeTrade {
        trade: LargeTradeEvent,
    },
    PositionOpened {
        position: Box<Position>,
    },
    PositionClosed {
        closed: Box<ClosedPosition>,
    },
}

impl MarketEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[derive(Clone)]
pub struct Publisher {
    sender: broadcast::Sender<String>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Returns how many consumers received the event
    pub fn publish(&self, event: &MarketEvent) -> usize {
        self.sender.send(event.to_json()).unwrap_or(0)
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Debug-level consumer counting events by tag until every publisher is gone
///
/// Returns the final counts; lagged events are counted under `LAGGED`.
pub async fn log_events(mut receiver: broadcast::Receiver<String>) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    loop {
        match receiver.recv().await {
            Ok(json) => {
                let tag = serde_json::from_str::<serde_json::Value>(&json)
                    .ok()
                    .and_then(|v| v["event"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "UNKNOWN".to_string());
                let seen = counts.entry(tag.clone()).or_default();
                *seen += 1;
                tracing::debug!(event = %tag, seen = *seen, "📡 Published");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event logger lagged, skipped {} events", skipped);
                *counts.entry("LAGGED".to_string()).or_default() += skipped;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderClass, TradeSide};

    fn large_trade() -> MarketEvent {
        MarketEvent::LargeTrade {
            trade: LargeTradeEvent {
                instrument: "BTCUSDT".to_string(),
                side: TradeSide::Buy,
                price: 65_000.0,
                quantity: 3.0,
                classification: OrderClass::Institution,
                timestamp: 1_700_000_000_000,
            },
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = Publisher::new(8);
        assert_eq!(publisher.publish(&large_trade()), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_tagged_json() {
        let publisher = Publisher::new(8);
        let mut rx = publisher.subscribe();

        assert_eq!(publisher.publish(&large_trade()), 1);

        let json: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["event"], "LARGE_TRADE");
        assert_eq!(json["trade"]["classification"], "INSTITUTION");
        assert_eq!(json["trade"]["side"], "BUY");
    }

    #[test]
    fn test_summary_serialization() {
        let event = MarketEvent::Summary {
            timestamp: 1,
            instruments: vec![InstrumentSummary {
                instrument: "ETHUSDT".to_string(),
                last_price: Some(3000.0),
                buy_volume: 12.0,
                sell_volume: 2.0,
                net_volume: 10.0,
                trade_count: 4,
                large_trade_count: 0,
                indicators: IndicatorSet::default(),
                current_signal: Signal::Long,
                confirmed_signal: Signal::Neutral,
                confidence: 0.4,
                signal_duration_secs: 0,
                funding_rate: None,
                open_interest: Some(1.5),
            }],
        };

        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["event"], "SUMMARY");
        assert_eq!(json["instruments"][0]["confirmedSignal"], "NEUTRAL");
        assert_eq!(json["instruments"][0]["netVolume"], 10.0);
        assert!(json["instruments"][0]["fundingRate"].is_null());
    }

    #[test]
    fn test_signal_only_summary() {
        let mut state = SignalState::new(1_000);
        state.current_signal = Signal::Short;
        state.confirmed_signal = Signal::Short;
        state.signal_start_timestamp = 1_000;
        state.last_confidence = 0.6;

        let summary = InstrumentSummary::signal_only("BTCUSDT", &state, 11_000);
        assert_eq!(summary.last_price, None);
        assert_eq!(summary.confirmed_signal, Signal::Short);
        assert_eq!(summary.signal_duration_secs, 10);
        assert_eq!(summary.trade_count, 0);
    }

    #[tokio::test]
    async fn test_log_events_counts_by_tag() {
        let publisher = Publisher::new(8);
        let logger = tokio::spawn(log_events(publisher.subscribe()));

        publisher.publish(&large_trade());
        publisher.publish(&large_trade());
        publisher.publish(&MarketEvent::Summary {
            timestamp: 1,
            instruments: Vec::new(),
        });
        drop(publisher);

        let counts = logger.await.unwrap();
        assert_eq!(counts.get("LARGE_TRADE"), Some(&2));
        assert_eq!(counts.get("SUMMARY"), Some(&1));
        assert_eq!(counts.get("LAGGED"), None);
    }
}
