// Outbound signal alerts with a per-instrument rolling quota
use crate::api::TelegramNotifier;
use crate::indicators::MacdValue;
use crate::models::Signal;
use crate::settings::TelegramSettings;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ALERT_QUEUE_CAPACITY: usize = 64;

/// Confirmed-signal change worth telling a human about
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAlert {
    pub instrument: String,
    pub signal: Signal,
    pub confidence: f64,
    pub price: f64,
    pub net_volume: f64,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub duration_secs: i64,
}

pub fn format_alert(alert: &SignalAlert) -> String {
    let icon = match alert.signal {
        Signal::Long => "🟢",
        Signal::Short => "🔴",
        Signal::Neutral => "⚪",
    };
    let rsi = alert
        .rsi
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string());
    let macd = alert
        .macd
        .map(|m| format!("{:.4} / {:.4} (hist {:.4})", m.macd, m.signal, m.histogram()))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "{} *{}* signal changed to *{}*\n\
         Confidence: {:.0}%\n\
         Price: {}\n\
         Net volume: {:.4}\n\
         RSI: {}\n\
         MACD / signal: {}\n\
         Held for: {}s",
        icon,
        alert.instrument,
        alert.signal,
        alert.confidence * 100.0,
        alert.price,
        alert.net_volume,
        rsi,
        macd,
        alert.duration_secs
    )
}

/// At most `max_alerts` per instrument in any trailing `window_ms`
///
/// A slot is taken when a send is attempted, whether or not it succeeds.
#[derive(Debug, Clone)]
pub struct AlertLimiter {
    max_alerts: usize,
    window_ms: i64,
    sent: HashMap<String, VecDeque<i64>>,
}

impl AlertLimiter {
    pub fn new(max_alerts: usize, window_ms: i64) -> Self {
        Self {
            max_alerts,
            window_ms,
            sent: HashMap::new(),
        }
    }

    /// Take a slot for `instrument` if one is free
    pub fn try_acquire(&mut self, instrument: &str, now: i64) -> bool {
        let history = self.sent.entry(instrument.to_string()).or_default();
        while history
            .front()
            .is_some_and(|&t| now - t >= self.window_ms)
        {
            history.pop_front();
        }

        if history.len() >= self.max_alerts {
            return false;
        }
        history.push_back(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    Failed,
    RateLimited,
    Disabled,
}

/// Owns the quota and the channel; lives in the tick task
pub struct AlertDispatcher {
    limiter: AlertLimiter,
    notifier: Option<TelegramNotifier>,
}

impl AlertDispatcher {
    pub fn new(settings: &TelegramSettings, notifier: Option<TelegramNotifier>) -> Self {
        Self {
            limiter: AlertLimiter::new(settings.max_alerts_per_window, settings.alert_window_ms),
            notifier,
        }
    }

    pub async fn dispatch(&mut self, alert: &SignalAlert, now: i64) -> AlertOutcome {
        let Some(notifier) = &self.notifier else {
            return AlertOutcome::Disabled;
        };

        if !self.limiter.try_acquire(&alert.instrument, now) {
            tracing::info!(
                symbol = %alert.instrument,
                "Alert quota exhausted, dropping {} alert",
                alert.signal
            );
            return AlertOutcome::RateLimited;
        }

        match notifier.send(&format_alert(alert)).await {
            Ok(()) => {
                tracing::info!(symbol = %alert.instrument, "📨 Sent {} alert", alert.signal);
                AlertOutcome::Sent
            }
            Err(e) => {
                tracing::error!(symbol = %alert.instrument, "Failed to send alert: {}", e);
                AlertOutcome::Failed
            }
        }
    }

    /// Plain message outside the per-instrument quota, e.g. startup/shutdown
    pub async fn notice(&self, text: &str) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send(text).await {
                tracing::warn!("Failed to send notice: {}", e);
            }
        }
    }
}

/// Non-blocking handle the tick loop pushes alerts into
///
/// Alerts are sent one at a time by a dedicated task that owns the
/// [`AlertDispatcher`], so a slow or hung channel never delays a tick. When
/// the queue is full the alert is dropped, like a rate-limited one.
#[derive(Clone)]
pub struct AlertQueue {
    sender: mpsc::Sender<(SignalAlert, i64)>,
}

impl AlertQueue {
    /// Start the sender task; it ends and hands the dispatcher back once every
    /// queue handle is dropped and the backlog is drained
    pub fn spawn(mut dispatcher: AlertDispatcher) -> (Self, JoinHandle<AlertDispatcher>) {
        let (sender, mut receiver) = mpsc::channel::<(SignalAlert, i64)>(ALERT_QUEUE_CAPACITY);

        let task = tokio::spawn(async move {
            while let Some((alert, now)) = receiver.recv().await {
                dispatcher.dispatch(&alert, now).await;
            }
            dispatcher
        });

        (Self { sender }, task)
    }

    /// Returns false if the alert was dropped
    pub fn push(&self, alert: SignalAlert, now: i64) -> bool {
        match self.sender.try_send((alert, now)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full((alert, _))) => {
                tracing::warn!(
                    symbol = %alert.instrument,
                    "Alert queue full, dropping {} alert",
                    alert.signal
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed((alert, _))) => {
                tracing::warn!(
                    symbol = %alert.instrument,
                    "Alert task stopped, dropping {} alert",
                    alert.signal
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOUR: i64 = 60 * 60_000;

    fn alert(instrument: &str) -> SignalAlert {
        SignalAlert {
            instrument: instrument.to_string(),
            signal: Signal::Long,
            confidence: 0.62,
            price: 65_000.5,
            net_volume: 12.5,
            rsi: Some(24.5),
            macd: Some(MacdValue {
                macd: 1.5,
                signal: 0.75,
            }),
            duration_secs: 0,
        }
    }

    #[test]
    fn test_limiter_allows_three_per_hour() {
        let mut limiter = AlertLimiter::new(3, HOUR);
        assert!(limiter.try_acquire("BTCUSDT", 0));
        assert!(limiter.try_acquire("BTCUSDT", 1_000));
        assert!(limiter.try_acquire("BTCUSDT", 2_000));
        assert!(!limiter.try_acquire("BTCUSDT", 3_000));

        // Other instruments have their own quota
        assert!(limiter.try_acquire("ETHUSDT", 3_000));
    }

    #[test]
    fn test_limiter_window_rolls() {
        let mut limiter = AlertLimiter::new(3, HOUR);
        for t in [0, 10_000, 20_000] {
            assert!(limiter.try_acquire("BTCUSDT", t));
        }

        assert!(!limiter.try_acquire("BTCUSDT", HOUR - 1));
        assert!(limiter.try_acquire("BTCUSDT", HOUR));
        assert!(!limiter.try_acquire("BTCUSDT", HOUR + 1));
        assert!(limiter.try_acquire("BTCUSDT", HOUR + 10_000));
    }

    #[test]
    fn test_format_alert() {
        let text = format_alert(&alert("BTCUSDT"));
        assert!(text.contains("*BTCUSDT* signal changed to *LONG*"));
        assert!(text.contains("Confidence: 62%"));
        assert!(text.contains("RSI: 24.50"));
        assert!(text.contains("1.5000 / 0.7500 (hist 0.7500)"));

        let mut bare = alert("ETHUSDT");
        bare.rsi = None;
        bare.macd = None;
        let text = format_alert(&bare);
        assert!(text.contains("RSI: n/a"));
        assert!(text.contains("MACD / signal: n/a"));
    }

    #[tokio::test]
    async fn test_dispatch_without_notifier() {
        let mut dispatcher = AlertDispatcher::new(&TelegramSettings::default(), None);
        assert_eq!(
            dispatcher.dispatch(&alert("BTCUSDT"), 0).await,
            AlertOutcome::Disabled
        );
    }

    #[tokio::test]
    async fn test_failed_sends_consume_quota() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let settings = TelegramSettings {
            enabled: true,
            bot_token: "token".to_string(),
            chat_id: "1".to_string(),
            api_base: server.url(),
            ..TelegramSettings::default()
        };
        let notifier = TelegramNotifier::new(&settings).unwrap();
        let mut dispatcher = AlertDispatcher::new(&settings, Some(notifier));

        for t in 0..3 {
            assert_eq!(
                dispatcher.dispatch(&alert("BTCUSDT"), t).await,
                AlertOutcome::Failed
            );
        }
        assert_eq!(
            dispatcher.dispatch(&alert("BTCUSDT"), 3).await,
            AlertOutcome::RateLimited
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_queue_push_does_not_wait_for_slow_channel() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_millis(500));
                w.write_all(br#"{"ok":true}"#)
            })
            .expect(2)
            .create_async()
            .await;

        let settings = TelegramSettings {
            enabled: true,
            bot_token: "token".to_string(),
            chat_id: "1".to_string(),
            api_base: server.url(),
            ..TelegramSettings::default()
        };
        let notifier = TelegramNotifier::new(&settings).unwrap();
        let (queue, task) = AlertQueue::spawn(AlertDispatcher::new(&settings, Some(notifier)));

        let started = std::time::Instant::now();
        assert!(queue.push(alert("BTCUSDT"), 0));
        assert!(queue.push(alert("ETHUSDT"), 0));
        assert!(started.elapsed() < std::time::Duration::from_millis(100));

        // Dropping the last handle drains the backlog and ends the task
        drop(queue);
        let dispatcher = task.await.unwrap();
        mock.assert_async().await;

        // Quota stays with the dispatcher: both instruments used one slot each
        let mut limiter = dispatcher.limiter;
        assert!(limiter.try_acquire("BTCUSDT", 1));
        assert!(limiter.try_acquire("BTCUSDT", 2));
        assert!(!limiter.try_acquire("BTCUSDT", 3));
    }

    #[tokio::test]
    async fn test_queue_push_after_task_stopped() {
        let dispatcher = AlertDispatcher::new(&TelegramSettings::default(), None);
        let (queue, task) = AlertQueue::spawn(dispatcher);
        task.abort();
        let _ = task.await;
        assert!(!queue.push(alert("BTCUSDT"), 0));
    }
}
