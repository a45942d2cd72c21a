//! Outbound notifications
//!
//! Bills are delivered as plain text to the chat bound to an apartment.
//! The transport is a trait so billing flows run unchanged without a
//! configured bot (and tests can observe what would have been sent).
//! Delivery failures are reported as `Ok(false)`, never as errors: an
//! unreachable chat must not fail a billing operation.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Env var holding the Telegram bot token
pub const TG_TOKEN_ENV: &str = "METERBILL_TG_TOKEN";

/// Delivers one text message to a chat.
///
/// Returns whether the message was actually delivered; callers treat
/// `false` as "the bill is still unsent".
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<bool>;
}

/// Telegram Bot API sender
pub struct TelegramSender {
    http_client: reqwest::Client,
    token: String,
}

impl TelegramSender {
    pub fn new(token: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            token: token.trim().to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let token = std::env::var(TG_TOKEN_ENV).ok()?;
        if token.trim().is_empty() {
            return None;
        }
        Some(Self::new(&token))
    }
}

/// Request to the Telegram sendMessage API
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<bool> {
        let request = SendMessageRequest { chat_id, text };

        let response = self
            .http_client
            .post(format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.token
            ))
            .json(&request)
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => {
                info!("Message delivered to chat {}", chat_id);
                Ok(true)
            }
            Ok(r) => {
                warn!(
                    "Telegram rejected message to chat {}: HTTP {}",
                    chat_id,
                    r.status()
                );
                Ok(false)
            }
            Err(e) => {
                warn!("Telegram send to chat {} failed: {}", chat_id, e);
                Ok(false)
            }
        }
    }
}

/// Sender used when no transport is configured; delivers nothing
pub struct NoopSender;

#[async_trait]
impl NotificationSender for NoopSender {
    async fn send(&self, chat_id: i64, _text: &str) -> Result<bool> {
        debug!(
            "No notification transport configured; chat {} not notified",
            chat_id
        );
        Ok(false)
    }
}
