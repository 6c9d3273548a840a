use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::backend::NotifyBackend;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API backend posting to a single chat.
pub struct TelegramBot {
    http: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramBot {
    /// Verify the bot token with `getMe` before handing out a backend.
    pub async fn connect(token: &str, chat_id: &str) -> anyhow::Result<Self> {
        Self::connect_to(TELEGRAM_API, token, chat_id).await
    }

    pub async fn connect_to(api_base: &str, token: &str, chat_id: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to create HTTP client")?;

        let bot = Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        };

        let resp = bot
            .http
            .get(bot.method_url("getMe"))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Telegram getMe request failed")?;
        bot.check(resp).await.context("Telegram rejected bot token")?;

        info!("Telegram bot initialized successfully");
        Ok(bot)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn check(&self, resp: reqwest::Response) -> anyhow::Result<()> {
        let status = resp.status();
        let body: ApiResponse = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("unexpected Telegram response (status {status})"))?;
        if !body.ok {
            bail!(
                "Telegram API error (status {status}): {}",
                body.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for TelegramBot {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        self.check(resp).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
