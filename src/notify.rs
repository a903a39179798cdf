use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

/// Best-effort outbound messages to an owner. Callers log failures and move
/// on; a broken gateway must never block a balance mutation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, owner_id: i64, text: &str) -> Result<()>;
}

/// key: notifier-telegram -> sendMessage gateway
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, owner_id: i64, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            self.token
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": owner_id, "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("sendMessage returned {}", response.status());
        }
        Ok(())
    }
}

/// Used when no gateway token is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, owner_id: i64, text: &str) -> Result<()> {
        tracing::debug!(owner_id, text, "notification dropped (no gateway configured)");
        Ok(())
    }
}
