use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::services::store_service::Store;

const CAMPAIGNS_URL: &str = "https://www.twitch.tv/drops/campaigns";

/// Optional outbound messaging channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Ok(false) when the sink is not configured.
    async fn send(&self, text: &str, photo_url: Option<&str>) -> ApiResult<bool>;
}

/// Telegram bot API sink. Token and chat id are read from the store on every send.
pub struct TelegramService {
    client: Client,
    store: Store,
}

impl TelegramService {
    pub fn new(store: Store) -> Self {
        Self {
            client: Client::new(),
            store,
        }
    }

    async fn credentials(&self) -> Option<(String, String)> {
        let settings = match self.store.settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("⚠️ Could not read Telegram settings: {}", e);
                return None;
            }
        };
        match (settings.telegram_bot_token, settings.telegram_chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some((token, chat_id))
            }
            _ => None,
        }
    }
}

pub(crate) fn build_request(chat_id: &str, text: &str, photo_url: Option<&str>) -> (&'static str, Value) {
    let keyboard = json!({
        "inline_keyboard": [[
            { "text": "🎮 Open Twitch Drops", "url": CAMPAIGNS_URL }
        ]]
    });

    match photo_url {
        Some(photo) => (
            "sendPhoto",
            json!({
                "chat_id": chat_id,
                "photo": photo,
                "caption": text,
                "parse_mode": "HTML",
                "reply_markup": keyboard
            }),
        ),
        None => (
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": keyboard
            }),
        ),
    }
}

#[async_trait]
impl MessageSink for TelegramService {
    async fn send(&self, text: &str, photo_url: Option<&str>) -> ApiResult<bool> {
        let Some((token, chat_id)) = self.credentials().await else {
            debug!("[Telegram] Not configured, skipping message");
            return Ok(false);
        };

        let (method, body) = build_request(&chat_id, text, photo_url);
        let url = format!("https://api.telegram.org/bot{}/{}", token, method);
        let response: Value = self.client.post(url).json(&body).send().await?.json().await?;

        if response["ok"].as_bool().unwrap_or(false) {
            Ok(true)
        } else {
            Err(ApiError::Remote(
                response["description"]
                    .as_str()
                    .unwrap_or("Telegram request failed")
                    .to_string(),
            ))
        }
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
