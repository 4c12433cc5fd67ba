//! Process-wide, read-only configuration.
//!
//! Defaults reproduce the production watchlist (four USDT-margined perpetuals).
//! A TOML file and `WHALEWATCH__*` environment variables can override any field:
//!
//! ```text
//! WHALEWATCH__SIGNAL__PERSISTENCE_MS=45000
//! WHALEWATCH__TELEGRAM__ENABLED=true
//! ```

use crate::{Error, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Threshold used for instruments without an explicit large-trade entry
pub const DEFAULT_LARGE_TRADE_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub instruments: Vec<String>,
    pub large_trade_thresholds: HashMap<String, f64>,
    pub net_volume_thresholds: HashMap<String, f64>,
    pub windows: WindowSettings,
    pub rsi_periods: RsiPeriods,
    pub indicators: IndicatorSettings,
    pub signal: SignalSettings,
    pub risk: RiskSettings,
    pub runtime: RuntimeSettings,
    pub telegram: TelegramSettings,
}

/// Trailing window durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub short_ms: i64,
    pub main_ms: i64,
    pub long_ms: i64,
    pub extended_ms: i64,
    pub ultra_long_ms: i64,
}

impl WindowSettings {
    /// Largest configured window; the buffer never keeps anything older
    pub fn max_ms(&self) -> i64 {
        [
            self.short_ms,
            self.main_ms,
            self.long_ms,
            self.extended_ms,
            self.ultra_long_ms,
        ]
        .into_iter()
        .max()
        .unwrap_or(self.main_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiPeriods {
    pub short: usize,
    pub main: usize,
    pub long: usize,
    pub extended: usize,
    pub ultra_long: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub macd_signal_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    /// Look-back for both the ATR proxy and the volatility proxy
    pub volatility_lookback: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub persistence_ms: i64,
    pub cooldown_ms: i64,
    pub whale_lookback_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub portfolio_balance: f64,
    pub max_portfolio_risk: f64,
    pub take_profit_ratio: f64,
    /// Confirmed signals below this confidence never open a position
    pub min_open_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub tick_interval_ms: u64,
    pub snapshot_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub enrichment_cache_secs: u64,
    pub feed_url: String,
    pub rest_base_url: String,
    pub redis_url: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub max_alerts_per_window: usize,
    pub alert_window_ms: i64,
}

impl Default for Settings {
    fn default() -> Self {
        let thresholds = |values: [f64; 4]| {
            ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT"]
                .iter()
                .zip(values)
                .map(|(s, v)| (s.to_string(), v))
                .collect::<HashMap<_, _>>()
        };

        Self {
            instruments: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "BNBUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            large_trade_thresholds: thresholds([0.5, 10.0, 50.0, 500.0]),
            net_volume_thresholds: thresholds([1.0, 20.0, 100.0, 1000.0]),
            windows: WindowSettings::default(),
            rsi_periods: RsiPeriods::default(),
            indicators: IndicatorSettings::default(),
            signal: SignalSettings::default(),
            risk: RiskSettings::default(),
            runtime: RuntimeSettings::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            short_ms: 60_000,
            main_ms: 3 * 60_000,
            long_ms: 5 * 60_000,
            extended_ms: 15 * 60_000,
            ultra_long_ms: 30 * 60_000,
        }
    }
}

impl Default for RsiPeriods {
    fn default() -> Self {
        Self {
            short: 1,
            main: 3,
            long: 5,
            extended: 15,
            ultra_long: 30,
        }
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_short_period: 12,
            ema_long_period: 26,
            macd_signal_period: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            volatility_lookback: 14,
        }
    }
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            persistence_ms: 30_000,
            cooldown_ms: 60_000,
            whale_lookback_ms: 5 * 60_000,
        }
    }
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            portfolio_balance: 100_000.0,
            max_portfolio_risk: 0.01,
            take_profit_ratio: 2.0,
            min_open_confidence: 0.5,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            snapshot_interval_secs: 30,
            reconnect_delay_secs: 5,
            enrichment_cache_secs: 300,
            feed_url: "wss://fstream.binance.com/stream".to_string(),
            rest_base_url: "https://fapi.binance.com".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            log_level: "whalewatch=info".to_string(),
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            max_alerts_per_window: 3,
            alert_window_ms: 60 * 60_000,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then `WHALEWATCH__` env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            tracing::info!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("WHALEWATCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("instruments")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        let settings = settings.normalized();
        settings.validate()?;

        Ok(settings)
    }

    /// Upper-case every instrument symbol so lookups are case-insensitive
    pub fn normalized(mut self) -> Self {
        self.instruments = self
            .instruments
            .iter()
            .map(|s| s.trim().to_uppercase())
            .collect();
        self.large_trade_thresholds = self
            .large_trade_thresholds
            .drain()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        self.net_volume_thresholds = self
            .net_volume_thresholds
            .drain()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(Error::InvalidSettings("no instruments configured".into()));
        }

        let periods = [
            ("rsi_periods.short", self.rsi_periods.short),
            ("rsi_periods.main", self.rsi_periods.main),
            ("rsi_periods.long", self.rsi_periods.long),
            ("rsi_periods.extended", self.rsi_periods.extended),
            ("rsi_periods.ultra_long", self.rsi_periods.ultra_long),
            ("indicators.ema_short_period", self.indicators.ema_short_period),
            ("indicators.ema_long_period", self.indicators.ema_long_period),
            ("indicators.macd_signal_period", self.indicators.macd_signal_period),
            ("indicators.bb_period", self.indicators.bb_period),
            ("indicators.volatility_lookback", self.indicators.volatility_lookback),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(Error::InvalidSettings(format!("{} must be positive", name)));
        }

        let w = &self.windows;
        if [w.short_ms, w.main_ms, w.long_ms, w.extended_ms, w.ultra_long_ms]
            .iter()
            .any(|ms| *ms <= 0)
        {
            return Err(Error::InvalidSettings("window durations must be positive".into()));
        }

        if self.risk.max_portfolio_risk <= 0.0 || self.risk.portfolio_balance <= 0.0 {
            return Err(Error::InvalidSettings(
                "portfolio balance and risk fraction must be positive".into(),
            ));
        }

        if self.telegram.enabled
            && (self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty())
        {
            return Err(Error::InvalidSettings(
                "telegram enabled without bot_token/chat_id".into(),
            ));
        }

        Ok(())
    }

    /// Large-trade threshold for an instrument, falling back to 100 units
    pub fn large_trade_threshold(&self, instrument: &str) -> f64 {
        self.large_trade_thresholds
            .get(instrument)
            .copied()
            .unwrap_or(DEFAULT_LARGE_TRADE_THRESHOLD)
    }

    /// Net-volume threshold for an instrument, zero when unconfigured
    pub fn net_volume_threshold(&self, instrument: &str) -> f64 {
        self.net_volume_thresholds
            .get(instrument)
            .copied()
            .unwrap_or(0.0)
    }
}
