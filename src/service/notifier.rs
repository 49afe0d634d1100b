// service/notifier.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NotifyError {
    /// The request URL carries the bot token, so it is stripped first.
    #[error("Notification request failed: {0}")]
    Transport(reqwest::Error),

    #[error("Notification channel answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(error: reqwest::Error) -> Self {
        NotifyError::Transport(error.without_url())
    }
}

/// Plain-text outcome channel for operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Telegram bot `sendMessage`.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Self::with_base_url("https://api.telegram.org", token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(TELEGRAM_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("chat_id", self.chat_id.as_str()), ("text", message)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Used when no chat channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!("Payment notification: {}", message);
        Ok(())
    }
}

pub fn notifier_from_config(config: &Config) -> Result<Arc<dyn Notifier>, NotifyError> {
    match (&config.telegram_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Ok(Arc::new(TelegramNotifier::new(token, chat_id)?)),
        _ => {
            tracing::info!("Telegram not configured - payment notifications go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Fire-and-forget delivery: never blocks the caller, failures are only logged.
pub fn dispatch(notifier: Arc<dyn Notifier>, message: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&message).await {
            tracing::warn!("Failed to deliver payment notification: {}", e);
        }
    });
}
