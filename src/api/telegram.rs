use crate::settings::TelegramSettings;
use crate::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Telegram Bot API client for outbound alerts
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                settings.api_base.trim_end_matches('/'),
                settings.bot_token
            ),
            chat_id: settings.chat_id.clone(),
        })
    }

    /// Build a notifier only when alerts are enabled
    ///
    /// Credentials are checked by `Settings::validate`.
    pub fn from_settings(settings: &TelegramSettings) -> Result<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }
        Self::new(settings).map(Some)
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("telegram returned {}: {}", status, detail)));
        }

        Ok(())
    }
}
