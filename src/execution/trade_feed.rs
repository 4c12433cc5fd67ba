use super::TradeBuffer;
use crate::events::{MarketEvent, Publisher};
use crate::models::{LargeTradeEvent, Trade, TradeSide};
use crate::settings::Settings;
use crate::strategy::classify;
use crate::{Error, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const AGG_TRADE_SUFFIX: &str = "@aggTrade";

/// One trade as delivered by the exchange stream, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTrade {
    pub instrument: String,
    pub price: f64,
    pub quantity: f64,
    pub side: TradeSide,
    pub trade_time: i64,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AggTradePayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: i64,
    /// Buyer is the maker, so the aggressor sold
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

/// Decode a combined-stream message
///
/// Returns `Ok(None)` for streams other than aggTrade.
pub fn parse_agg_trade(text: &str) -> Result<Option<FeedTrade>> {
    let envelope: StreamEnvelope = serde_json::from_str(text)?;
    if !envelope.stream.ends_with(AGG_TRADE_SUFFIX) {
        return Ok(None);
    }

    let payload: AggTradePayload = serde_json::from_value(envelope.data)?;
    let price = parse_decimal(&payload.price, "price")?;
    let quantity = parse_decimal(&payload.quantity, "quantity")?;

    Ok(Some(FeedTrade {
        instrument: payload.symbol.to_uppercase(),
        price,
        quantity,
        side: if payload.buyer_is_maker {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        },
        trade_time: payload.trade_time,
    }))
}

fn parse_decimal(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::MalformedMessage(format!("{} is not a number: {:?}", field, value)))
}

/// Combined-stream URL subscribing to aggTrade for every instrument
pub fn stream_url(base: &str, instruments: &[String]) -> String {
    let streams: Vec<String> = instruments
        .iter()
        .map(|s| format!("{}{}", s.to_lowercase(), AGG_TRADE_SUFFIX))
        .collect();
    format!("{}?streams={}", base, streams.join("/"))
}

/// Classifies and records feed trades, announcing large ones immediately
#[derive(Clone)]
pub struct TradeIngestor {
    buffer: TradeBuffer,
    settings: Arc<Settings>,
    publisher: Publisher,
}

impl TradeIngestor {
    pub fn new(buffer: TradeBuffer, settings: Arc<Settings>, publisher: Publisher) -> Self {
        Self {
            buffer,
            settings,
            publisher,
        }
    }

    /// Returns the recorded trade, or `None` if the instrument is not tracked
    pub fn ingest(&self, feed_trade: FeedTrade) -> Result<Option<Trade>> {
        let classification = classify(feed_trade.quantity, &feed_trade.instrument, &self.settings);
        let trade = Trade {
            instrument: feed_trade.instrument,
            price: feed_trade.price,
            quantity: feed_trade.quantity,
            side: feed_trade.side,
            timestamp: feed_trade.trade_time,
            classification,
        };

        if !self.buffer.record(trade.clone())? {
            return Ok(None);
        }

        if trade.quantity >= self.settings.large_trade_threshold(&trade.instrument) {
            tracing::info!(
                symbol = %trade.instrument,
                side = ?trade.side,
                quantity = trade.quantity,
                price = trade.price,
                class = ?trade.classification,
                "🐋 Large trade"
            );
            self.publisher.publish(&MarketEvent::LargeTrade {
                trade: LargeTradeEvent::from(&trade),
            });
        }

        Ok(Some(trade))
    }
}

/// Long-running exchange stream consumer
///
/// Reconnects after a fixed delay whenever the connection closes or fails.
pub struct TradeFeed {
    url: String,
    reconnect_delay: Duration,
    ingestor: TradeIngestor,
}

impl TradeFeed {
    pub fn new(settings: &Settings, ingestor: TradeIngestor) -> Self {
        Self {
            url: stream_url(&settings.runtime.feed_url, &settings.instruments),
            reconnect_delay: Duration::from_secs(settings.runtime.reconnect_delay_secs),
            ingestor,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(self) {
        loop {
            match self.consume().await {
                Ok(()) => tracing::warn!(
                    "Trade feed closed, reconnecting in {}s",
                    self.reconnect_delay.as_secs()
                ),
                Err(e) => tracing::error!(
                    "Trade feed error: {}, reconnecting in {}s",
                    e,
                    self.reconnect_delay.as_secs()
                ),
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn consume(&self) -> Result<()> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        tracing::info!("✅ Trade feed connected: {}", self.url);

        let (_write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => self.handle_text(&text),
                Message::Close(frame) => {
                    tracing::info!("Trade feed close frame: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_text(&self, text: &str) {
        let feed_trade = match parse_agg_trade(text) {
            Ok(Some(t)) => t,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Dropping malformed feed message: {}", e);
                return;
            }
        };

        if let Err(e) = self.ingestor.ingest(feed_trade) {
            tracing::error!("Failed to record trade: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderClass;

    const AGG_TRADE: &str = r#"{
        "stream": "btcusdt@aggTrade",
        "data": {
            "e": "aggTrade", "E": 1700000000100, "s": "BTCUSDT", "a": 5933014,
            "p": "65000.10", "q": "0.750", "f": 100, "l": 105,
            "T": 1700000000000, "m": false
        }
    }"#;

    fn ingestor() -> (TradeIngestor, TradeBuffer, Publisher) {
        let settings = Arc::new(Settings::default());
        let buffer = TradeBuffer::new(settings.instruments.clone(), settings.windows.max_ms());
        let publisher = Publisher::new(16);
        (
            TradeIngestor::new(buffer.clone(), settings, publisher.clone()),
            buffer,
            publisher,
        )
    }

    fn feed_trade(instrument: &str, quantity: f64) -> FeedTrade {
        FeedTrade {
            instrument: instrument.to_string(),
            price: 100.0,
            quantity,
            side: TradeSide::Buy,
            trade_time: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_parse_agg_trade() {
        let trade = parse_agg_trade(AGG_TRADE).unwrap().unwrap();
        assert_eq!(trade.instrument, "BTCUSDT");
        assert_eq!(trade.price, 65000.10);
        assert_eq!(trade.quantity, 0.75);
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.trade_time, 1_700_000_000_000);
    }

    #[test]
    fn test_buyer_maker_is_sell() {
        let text = AGG_TRADE.replace(r#""m": false"#, r#""m": true"#);
        assert_eq!(parse_agg_trade(&text).unwrap().unwrap().side, TradeSide::Sell);
    }

    #[test]
    fn test_other_streams_are_ignored() {
        let text = r#"{"stream": "btcusdt@depth", "data": {"bids": []}}"#;
        assert!(parse_agg_trade(text).unwrap().is_none());
    }

    #[test]
    fn test_malformed_messages_are_errors() {
        assert!(parse_agg_trade("not json").is_err());
        assert!(parse_agg_trade(r#"{"result": null, "id": 1}"#).is_err());

        let bad_price = AGG_TRADE.replace("65000.10", "abc");
        assert!(matches!(
            parse_agg_trade(&bad_price),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_stream_url() {
        let url = stream_url(
            "wss://fstream.binance.com/stream",
            &["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        );
        assert_eq!(
            url,
            "wss://fstream.binance.com/stream?streams=btcusdt@aggTrade/ethusdt@aggTrade"
        );
    }

    #[test]
    fn test_ingest_classifies_and_records() {
        let (ingestor, buffer, _publisher) = ingestor();

        let trade = ingestor.ingest(feed_trade("ETHUSDT", 12.0)).unwrap().unwrap();
        assert_eq!(trade.classification, OrderClass::Whale);
        assert_eq!(buffer.trade_count("ETHUSDT").unwrap(), 1);
    }

    #[test]
    fn test_ingest_drops_untracked_instrument() {
        let (ingestor, buffer, _publisher) = ingestor();
        assert!(ingestor.ingest(feed_trade("DOGEUSDT", 1.0)).unwrap().is_none());
        assert_eq!(buffer.trade_count("DOGEUSDT").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_large_trade_is_published_at_record_time() {
        let (ingestor, _buffer, publisher) = ingestor();
        let mut rx = publisher.subscribe();

        ingestor.ingest(feed_trade("BTCUSDT", 0.1)).unwrap();
        ingestor.ingest(feed_trade("BTCUSDT", 0.5)).unwrap();

        let json: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["event"], "LARGE_TRADE");
        assert_eq!(json["trade"]["quantity"], 0.5);
        assert_eq!(json["trade"]["classification"], "WHALE");
        assert!(rx.try_recv().is_err());
    }
}
