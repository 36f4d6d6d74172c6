//! Telegram Bot API notifier.
//!
//! `POST https://api.telegram.org/bot{token}/sendMessage` with
//! `chat_id` and `text`. A failed send is retried a fixed number of
//! times with a fixed delay; the HTTP timeout bounds each attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, warn};

use super::{NotifyError, Notifier};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    http: Client,
    token: SecretString,
    chat_id: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TelegramNotifier {
    pub fn new(
        token: SecretString,
        chat_id: String,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http,
            token,
            chat_id,
            max_attempts: max_attempts.max(1),
            retry_delay,
        })
    }

    async fn send_once(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{TELEGRAM_API_URL}/bot{}/sendMessage", self.token.expose_secret());

        let resp = self
            .http
            .post(&url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            // Never surface the URL: it carries the bot token.
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.send_once(text).await {
                Ok(()) => {
                    debug!(attempt, "Telegram message sent");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Telegram send failed");
                    last = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(NotifyError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}
