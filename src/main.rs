use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use whalewatch::api::{BinanceClient, TelegramNotifier};
use whalewatch::engine::Engine;
use whalewatch::events::{log_events, Publisher};
use whalewatch::execution::{TradeBuffer, TradeFeed, TradeIngestor};
use whalewatch::models::Enrichment;
use whalewatch::notify::{AlertDispatcher, AlertQueue};
use whalewatch::persistence::{RedisPersistence, Snapshot};
use whalewatch::Settings;

#[derive(Parser)]
#[command(name = "whalewatch")]
#[command(about = "Streams exchange trades and tracks whale-driven signals", long_about = None)]
struct Cli {
    /// TOML settings file, overridden by WHALEWATCH__* env vars
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start without restoring the last Redis snapshot
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    setup_logging(&settings.runtime.log_level);
    let settings = Arc::new(settings);

    tracing::info!("🚀 Whalewatch starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Instruments: {}", settings.instruments.join(", "));
    tracing::info!("  Tick interval: {}ms", settings.runtime.tick_interval_ms);
    tracing::info!(
        "  Persistence/cooldown: {}s / {}s",
        settings.signal.persistence_ms / 1000,
        settings.signal.cooldown_ms / 1000
    );
    for instrument in &settings.instruments {
        tracing::info!(
            "    - {} (large trade >= {})",
            instrument,
            settings.large_trade_threshold(instrument)
        );
    }

    let publisher = Publisher::default();
    let event_logger = tokio::spawn(log_events(publisher.subscribe()));
    let buffer = TradeBuffer::new(settings.instruments.iter(), settings.windows.max_ms());
    let mut engine = Engine::new(settings.clone());

    let mut redis = connect_to_redis(&settings.runtime.redis_url).await;
    if let Some(redis) = redis.as_mut() {
        if cli.fresh {
            tracing::info!("Skipping snapshot restore (--fresh)");
        } else {
            restore_snapshot(redis, &buffer, &mut engine).await;
        }
    }

    let binance = BinanceClient::new(
        settings.runtime.rest_base_url.clone(),
        Duration::from_secs(settings.runtime.enrichment_cache_secs),
    )
    .context("Failed to build Binance client")?;

    let notifier = TelegramNotifier::from_settings(&settings.telegram)
        .context("Failed to build Telegram notifier")?;
    if notifier.is_none() {
        tracing::info!("Telegram alerts disabled");
    }
    let dispatcher = AlertDispatcher::new(&settings.telegram, notifier);
    dispatcher
        .notice(&format!(
            "🚀 Whalewatch started: {}",
            settings.instruments.join(", ")
        ))
        .await;
    let (alerts, alert_task) = AlertQueue::spawn(dispatcher);

    let ingestor = TradeIngestor::new(buffer.clone(), settings.clone(), publisher.clone());
    let feed = TradeFeed::new(&settings, ingestor);
    tracing::info!("🔄 Connecting trade feed: {}", feed.url());
    let mut feed_task = tokio::spawn(feed.run());

    let mut ticker = interval(Duration::from_millis(settings.runtime.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut snapshot_ticker = interval(Duration::from_secs(settings.runtime.snapshot_interval_secs));
    snapshot_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Both intervals fire immediately; nothing worth saving yet
    snapshot_ticker.tick().await;

    tracing::info!("\nPress Ctrl+C to stop...\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            result = &mut feed_task => {
                tracing::error!("Trade feed task exited: {:?}", result);
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_tick(&settings, &buffer, &mut engine, &binance, &publisher, &alerts).await {
                    tracing::error!("Tick failed: {}", e);
                }
            }
            _ = snapshot_ticker.tick() => {
                if let Some(redis) = redis.as_mut() {
                    save_snapshot(redis, &buffer, &engine).await;
                }
            }
        }
    }

    if let Some(redis) = redis.as_mut() {
        save_snapshot(redis, &buffer, &engine).await;
    }

    // Drain queued alerts, but never wait on a hung channel for long
    drop(alerts);
    match tokio::time::timeout(Duration::from_secs(15), alert_task).await {
        Ok(Ok(dispatcher)) => dispatcher.notice("👋 Whalewatch stopped").await,
        Ok(Err(e)) => tracing::warn!("Alert task failed: {}", e),
        Err(_) => tracing::warn!("Gave up waiting for queued alerts"),
    }

    // The feed task holds the last publisher handle
    feed_task.abort();
    drop(publisher);
    if let Ok(Ok(counts)) = tokio::time::timeout(Duration::from_secs(1), event_logger).await {
        tracing::info!("Published events: {:?}", counts);
    }

    let positions = engine.positions();
    tracing::info!(
        "Open positions: {}, closed: {}, realized PnL: {:.2}",
        positions.open_positions().count(),
        positions.closed_count(),
        positions.total_pnl()
    );
    tracing::info!("👋 Whalewatch stopped");
    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_to_redis(redis_url: &str) -> Option<RedisPersistence> {
    match RedisPersistence::new(redis_url).await {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!("⚠️  Redis unavailable ({}), running without persistence", e);
            None
        }
    }
}

async fn restore_snapshot(redis: &mut RedisPersistence, buffer: &TradeBuffer, engine: &mut Engine) {
    let snapshot = match redis.load_snapshot().await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            tracing::info!("No saved snapshot, starting fresh");
            return;
        }
        Err(e) => {
            tracing::warn!("Failed to load snapshot, starting fresh: {}", e);
            return;
        }
    };

    if snapshot.is_empty() {
        tracing::info!("Saved snapshot is empty, starting fresh");
        return;
    }

    let Snapshot {
        trades,
        signal_states,
        indicator_states,
    } = snapshot;

    match buffer.restore(trades) {
        Ok(restored) => tracing::info!("✅ Restored {} buffered trades", restored),
        Err(e) => tracing::warn!("Failed to restore trades: {}", e),
    }
    tracing::info!("✅ Restored signal state for {} instruments", signal_states.len());
    engine.restore(signal_states, indicator_states);
}

async fn save_snapshot(redis: &mut RedisPersistence, buffer: &TradeBuffer, engine: &Engine) {
    let trades = match buffer.export() {
        Ok(trades) => trades,
        Err(e) => {
            tracing::warn!("Failed to export trade buffer: {}", e);
            return;
        }
    };

    let snapshot = Snapshot {
        trades,
        signal_states: engine.signal_states().clone(),
        indicator_states: engine.indicator_states().clone(),
    };

    if let Err(e) = redis.save_snapshot(&snapshot).await {
        tracing::warn!("  ✗ Failed to save snapshot: {}", e);
    }
}

async fn run_tick(
    settings: &Settings,
    buffer: &TradeBuffer,
    engine: &mut Engine,
    binance: &BinanceClient,
    publisher: &Publisher,
    alerts: &AlertQueue,
) -> whalewatch::Result<()> {
    let now = Utc::now().timestamp_millis();

    let pruned = buffer.prune(now)?;
    if pruned > 0 {
        tracing::debug!("Pruned {} expired trades", pruned);
    }
    let snapshot = buffer.snapshot(now)?;

    let enrichment: HashMap<String, Enrichment> = join_all(
        settings
            .instruments
            .iter()
            .map(|instrument| async move { (instrument.clone(), binance.enrichment(instrument).await) }),
    )
    .await
    .into_iter()
    .collect();

    let outcome = engine.run_tick(&snapshot, &enrichment, now);

    for event in outcome.events() {
        publisher.publish(&event);
    }

    for alert in outcome.alerts {
        alerts.push(alert, now);
    }

    Ok(())
}
