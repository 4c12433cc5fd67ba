use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggressor side of an executed trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Size bucket of a single trade relative to its instrument's threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderClass {
    Retail,
    Whale,
    Institution,
}

/// One executed trade as kept in the windowed buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub instrument: String,
    pub price: f64,
    pub quantity: f64,
    pub side: TradeSide,
    /// Trade time in epoch milliseconds
    pub timestamp: i64,
    pub classification: OrderClass,
}

/// Directional trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    #[default]
    Neutral,
    Long,
    Short,
}

impl Signal {
    pub fn is_directional(self) -> bool {
        self != Signal::Neutral
    }

    pub fn opposite(self) -> Signal {
        match self {
            Signal::Long => Signal::Short,
            Signal::Short => Signal::Long,
            Signal::Neutral => Signal::Neutral,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Neutral => "NEUTRAL",
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
        };
        f.write_str(s)
    }
}

/// Emitted at record time for any trade at or above its instrument's threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LargeTradeEvent {
    pub instrument: String,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    pub classification: OrderClass,
    pub timestamp: i64,
}

impl From<&Trade> for LargeTradeEvent {
    fn from(trade: &Trade) -> Self {
        Self {
            instrument: trade.instrument.clone(),
            side: trade.side,
            price: trade.price,
            quantity: trade.quantity,
            classification: trade.classification,
            timestamp: trade.timestamp,
        }
    }
}

/// Market context pulled from REST once per tick; unset values score neutral
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub open_interest: Option<f64>,
    pub funding_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Long).unwrap(), "\"LONG\"");
        assert_eq!(
            serde_json::from_str::<Signal>("\"SHORT\"").unwrap(),
            Signal::Short
        );
        assert_eq!(Signal::default(), Signal::Neutral);
    }

    #[test]
    fn test_signal_opposite() {
        assert_eq!(Signal::Long.opposite(), Signal::Short);
        assert_eq!(Signal::Short.opposite(), Signal::Long);
        assert_eq!(Signal::Neutral.opposite(), Signal::Neutral);
        assert!(!Signal::Neutral.is_directional());
    }

    #[test]
    fn test_large_trade_event_from_trade() {
        let trade = Trade {
            instrument: "BTCUSDT".to_string(),
            price: 65000.0,
            quantity: 3.0,
            side: TradeSide::Sell,
            timestamp: 1_700_000_000_000,
            classification: OrderClass::Institution,
        };

        let event = LargeTradeEvent::from(&trade);
        assert_eq!(event.instrument, "BTCUSDT");
        assert_eq!(event.side, TradeSide::Sell);
        assert_eq!(event.classification, OrderClass::Institution);
        assert_eq!(event.timestamp, trade.timestamp);
    }
}
