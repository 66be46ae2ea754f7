//! Telegram Channel Implementation
//!
//! Sends operator notifications through the Bot API and reads the update feed
//! with long-polling `getUpdates` calls.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::traits::Channel;
use super::types::{InboundMessage, InboundUpdate, OutboundMessage};
use crate::config::TELEGRAM_API_BASE;

/// Default timeout for Telegram API calls (seconds)
const API_TIMEOUT_SECS: u64 = 30;
/// Photo uploads get more room than plain API calls.
const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Telegram channel configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,
    /// Bot API root, overridable for tests
    pub api_base: String,
}

impl TelegramConfig {
    /// Create a new config with just the bot token
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Telegram channel implementation
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    async fn read_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let status = response.status();
        let body: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Telegram returned an unreadable body (HTTP {status})"))?;

        if body.ok {
            Ok(body.result)
        } else {
            Err(anyhow!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            ))
        }
    }

    /// Convert Telegram update to InboundUpdate
    fn convert_update(update: TelegramUpdate) -> InboundUpdate {
        let message = update.message.and_then(|message| {
            let text = message.text?;
            let sender_id = message
                .from
                .map(|from| from.id.to_string())
                .unwrap_or_default();
            Some(InboundMessage::new(
                format!("tg_{}", message.message_id),
                sender_id,
                message.chat.id.to_string(),
                text,
            ))
        });

        InboundUpdate {
            update_id: update.update_id,
            message,
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "Telegram"
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let mut params = serde_json::json!({
            "chat_id": message.conversation_id,
            "text": message.content,
        });

        if let Some(mode) = message.parse_mode {
            params["parse_mode"] = serde_json::Value::String(mode.as_str().to_string());
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&params)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        Self::read_response::<TelegramMessageResponse>(response).await?;
        debug!("Sent Telegram message to {}", message.conversation_id);
        Ok(())
    }

    async fn send_photo(&self, conversation_id: &str, path: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("capture.png")
            .to_string();

        let form = Form::new()
            .text("chat_id", conversation_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .send()
            .await?;

        Self::read_response::<TelegramMessageResponse>(response).await?;
        Ok(())
    }

    async fn fetch_updates(&self, offset: i64, long_poll: Duration) -> Result<Vec<InboundUpdate>> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": long_poll.as_secs(),
            "allowed_updates": ["message"],
        });

        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&params)
            .timeout(long_poll + Duration::from_secs(10))
            .send()
            .await?;

        let updates = Self::read_response::<Vec<TelegramUpdate>>(response)
            .await?
            .unwrap_or_default();

        Ok(updates.into_iter().map(Self::convert_update).collect())
    }
}

// ============================================================================
// Telegram API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramMessageResponse {
    #[allow(dead_code)]
    message_id: i64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(TelegramConfig::new("test-token").with_api_base(server.uri()))
    }

    #[test]
    fn test_api_url() {
        let channel = TelegramChannel::new(TelegramConfig::new("123:ABC"));
        assert_eq!(
            channel.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );

        let channel =
            TelegramChannel::new(TelegramConfig::new("t").with_api_base("http://localhost:9/"));
        assert_eq!(channel.api_url("getUpdates"), "http://localhost:9/bott/getUpdates");
    }

    #[test]
    fn test_convert_update() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 77,
            "message": {
                "message_id": 5,
                "from": {"id": 1001, "is_bot": false, "first_name": "Op"},
                "chat": {"id": -42, "type": "private"},
                "date": 1700000000,
                "text": "/code 123456"
            }
        }))
        .unwrap();

        let inbound = TelegramChannel::convert_update(update);
        assert_eq!(inbound.update_id, 77);
        let message = inbound.message.unwrap();
        assert_eq!(message.id, "tg_5");
        assert_eq!(message.sender_id, "1001");
        assert_eq!(message.chat_id, "-42");
        assert_eq!(message.content, "/code 123456");
    }

    #[test]
    fn test_convert_update_without_text_keeps_update_id() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 78,
            "message": {
                "message_id": 6,
                "chat": {"id": 42, "type": "private"},
                "date": 1700000000,
                "sticker": {"file_id": "x"}
            }
        }))
        .unwrap();

        let inbound = TelegramChannel::convert_update(update);
        assert_eq!(inbound.update_id, 78);
        assert!(inbound.message.is_none());
    }

    #[tokio::test]
    async fn test_send_uses_html_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "text": "<b>hello</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        channel_for(&server)
            .send(OutboundMessage::html("42", "<b>hello</b>"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_surfaces_api_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let error = channel_for(&server)
            .send(OutboundMessage::new("42", "hello"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_send_photo_uploads_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendPhoto"))
            .and(body_string_contains("name=\"photo\"; filename=\"03_two_factor.png\""))
            .and(body_string_contains("approve on phone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("03_two_factor.png");
        std::fs::write(&file, b"\x89PNG fake").unwrap();

        channel_for(&server)
            .send_photo("42", &file, "approve on phone")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_updates_sends_offset_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/getUpdates"))
            .and(body_partial_json(serde_json::json!({
                "offset": 11,
                "timeout": 20,
                "allowed_updates": ["message"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    {"update_id": 11, "message": {
                        "message_id": 9, "chat": {"id": 42, "type": "private"},
                        "date": 1700000000, "text": "hi"
                    }},
                    {"update_id": 12}
                ]
            })))
            .mount(&server)
            .await;

        let updates = channel_for(&server)
            .fetch_updates(11, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].message.as_ref().unwrap().content, "hi");
        assert_eq!(updates[1].update_id, 12);
        assert!(updates[1].message.is_none());
    }
}
