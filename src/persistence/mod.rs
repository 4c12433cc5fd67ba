use crate::indicators::IndicatorState;
use crate::models::Trade;
use crate::strategy::SignalState;
use crate::{Error, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::{timeout, Duration};

pub const DEFAULT_NAMESPACE: &str = "whalewatch";

/// Everything that survives a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub trades: HashMap<String, Vec<Trade>>,
    pub signal_states: HashMap<String, SignalState>,
    pub indicator_states: HashMap<String, IndicatorState>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.trades.values().all(|t| t.is_empty())
            && self.signal_states.is_empty()
            && self.indicator_states.is_empty()
    }
}

/// Redis persistence for the windowed buffer and per-instrument state
///
/// Each part is a JSON value under its own key: `{ns}:trades`,
/// `{ns}:signal_state` and `{ns}:indicator_state`.
pub struct RedisPersistence {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisPersistence {
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE).await
    }

    pub async fn with_namespace(redis_url: &str, namespace: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| Error::Timeout("Redis connection after 5 seconds".to_string()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, part: &str) -> String {
        format!("{}:{}", self.namespace, part)
    }

    /// Write all parts in one atomic pipeline
    pub async fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        let trades = serde_json::to_string(&snapshot.trades)?;
        let signals = serde_json::to_string(&snapshot.signal_states)?;
        let indicators = serde_json::to_string(&snapshot.indicator_states)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.key("trades"), trades)
            .ignore()
            .set(self.key("signal_state"), signals)
            .ignore()
            .set(self.key("indicator_state"), indicators)
            .ignore();
        let _: () = pipe.query_async(&mut self.conn).await?;

        tracing::debug!(
            "Saved snapshot: {} trades, {} signal states",
            snapshot.trades.values().map(Vec::len).sum::<usize>(),
            snapshot.signal_states.len()
        );

        Ok(())
    }

    /// Load whatever parts exist; `None` if nothing was ever saved
    pub async fn load_snapshot(&mut self) -> Result<Option<Snapshot>> {
        let (trades_key, signals_key, indicators_key) = (
            self.key("trades"),
            self.key("signal_state"),
            self.key("indicator_state"),
        );
        let trades: Option<String> = self.conn.get(trades_key).await?;
        let signals: Option<String> = self.conn.get(signals_key).await?;
        let indicators: Option<String> = self.conn.get(indicators_key).await?;

        if trades.is_none() && signals.is_none() && indicators.is_none() {
            return Ok(None);
        }

        Ok(Some(Snapshot {
            trades: decode_or_default(trades)?,
            signal_states: decode_or_default(signals)?,
            indicator_states: decode_or_default(indicators)?,
        }))
    }

    pub async fn clear(&mut self) -> Result<()> {
        let keys = [
            self.key("trades"),
            self.key("signal_state"),
            self.key("indicator_state"),
        ];
        let _: () = self.conn.del(&keys).await?;
        Ok(())
    }
}

fn decode_or_default<T: serde::de::DeserializeOwned + Default>(raw: Option<String>) -> Result<T> {
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(T::default()),
    }
}
