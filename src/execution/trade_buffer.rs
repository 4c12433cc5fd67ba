use crate::models::Trade;
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Thread-safe windowed buffer of recent trades
///
/// Holds one insertion-ordered sequence per tracked instrument. Trades are
/// dropped by age only, once they fall outside the largest configured window.
/// The feed task appends while the tick task prunes and snapshots, so the
/// buffer is shared behind a lock and cheap to clone.
#[derive(Clone)]
pub struct TradeBuffer {
    data: Arc<RwLock<HashMap<String, VecDeque<Trade>>>>,
    max_window_ms: i64,
}

impl TradeBuffer {
    /// Create a buffer tracking exactly `instruments`
    pub fn new<I, S>(instruments: I, max_window_ms: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let data = instruments
            .into_iter()
            .map(|s| (s.into(), VecDeque::new()))
            .collect();

        Self {
            data: Arc::new(RwLock::new(data)),
            max_window_ms,
        }
    }

    /// Append a trade
    ///
    /// Returns `false` and drops the trade if its instrument is not tracked.
    pub fn record(&self, trade: Trade) -> Result<bool> {
        let mut data = self.data.write()?;

        match data.get_mut(&trade.instrument) {
            Some(trades) => {
                trades.push_back(trade);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop every trade older than the largest window, across all instruments
    pub fn prune(&self, now: i64) -> Result<usize> {
        let mut data = self.data.write()?;
        let cutoff = now - self.max_window_ms;
        let mut removed = 0;

        for trades in data.values_mut() {
            let before = trades.len();
            trades.retain(|t| t.timestamp >= cutoff);
            removed += before - trades.len();
        }

        Ok(removed)
    }

    /// Trades of one instrument with `now - timestamp <= window_ms`, in order
    pub fn window_slice(&self, instrument: &str, window_ms: i64, now: i64) -> Result<Vec<Trade>> {
        let data = self.data.read()?;

        Ok(data
            .get(instrument)
            .map(|trades| slice_window(trades.iter(), window_ms, now))
            .unwrap_or_default())
    }

    /// Consistent copy of every instrument's trades within the largest window
    pub fn snapshot(&self, now: i64) -> Result<BufferSnapshot> {
        let data = self.data.read()?;

        let trades = data
            .iter()
            .map(|(instrument, trades)| {
                (
                    instrument.clone(),
                    slice_window(trades.iter(), self.max_window_ms, now),
                )
            })
            .collect();

        Ok(BufferSnapshot { taken_at: now, trades })
    }

    /// Raw contents for persistence
    pub fn export(&self) -> Result<HashMap<String, Vec<Trade>>> {
        let data = self.data.read()?;
        Ok(data
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect())
    }

    /// Load persisted trades for tracked instruments, replacing what is held
    ///
    /// Instruments that are no longer tracked are ignored.
    pub fn restore(&self, persisted: HashMap<String, Vec<Trade>>) -> Result<usize> {
        let mut data = self.data.write()?;
        let mut restored = 0;

        for (instrument, trades) in persisted {
            if let Some(buffer) = data.get_mut(&instrument) {
                restored += trades.len();
                *buffer = trades.into();
            } else {
                tracing::debug!("Skipping persisted trades for untracked {}", instrument);
            }
        }

        Ok(restored)
    }

    pub fn trade_count(&self, instrument: &str) -> Result<usize> {
        let data = self.data.read()?;
        Ok(data.get(instrument).map(|d| d.len()).unwrap_or(0))
    }
}

fn slice_window<'a>(trades: impl Iterator<Item = &'a Trade>, window_ms: i64, now: i64) -> Vec<Trade> {
    trades
        .filter(|t| now - t.timestamp <= window_ms)
        .cloned()
        .collect()
}

/// Point-in-time copy of the buffer that one tick computes against
#[derive(Debug, Clone, Default)]
pub struct BufferSnapshot {
    pub taken_at: i64,
    pub trades: HashMap<String, Vec<Trade>>,
}

impl BufferSnapshot {
    pub fn trades(&self, instrument: &str) -> &[Trade] {
        self.trades
            .get(instrument)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Subset of an instrument's snapshot within `window_ms` of the snapshot time
    pub fn window(&self, instrument: &str, window_ms: i64) -> Vec<Trade> {
        slice_window(self.trades(instrument).iter(), window_ms, self.taken_at)
    }

    pub fn prices(&self, instrument: &str, window_ms: i64) -> Vec<f64> {
        self.trades(instrument)
            .iter()
            .filter(|t| self.taken_at - t.timestamp <= window_ms)
            .map(|t| t.price)
            .collect()
    }
}
