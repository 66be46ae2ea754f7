use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::code::OperatorCode;
use super::telegram::{TelegramChannel, TelegramConfig};
use super::traits::Channel;
use super::types::OutboundMessage;
use crate::config::RelayConfig;

/// Longest single `getUpdates` hold.
const LONG_POLL: Duration = Duration::from_secs(20);
const MIN_LONG_POLL: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(2);
/// Telegram's caption limit, in characters.
const MAX_CAPTION_CHARS: usize = 1024;

/// Read position in the operator's update feed.
///
/// Only [`Relay::fast_forward`] hands one out, so every wait starts after the
/// backlog that existed when it began.
#[derive(Debug, PartialEq, Eq)]
pub struct UpdateCursor {
    offset: i64,
}

impl UpdateCursor {
    pub fn offset(&self) -> i64 {
        self.offset
    }

    fn advance_past(&mut self, update_id: i64) {
        self.offset = self.offset.max(update_id + 1);
    }
}

/// Operator-facing side of the channel.
///
/// Every send is best-effort: failures are logged and swallowed. An
/// unconfigured relay turns all operations into no-ops.
pub struct Relay {
    channel: Option<Arc<dyn Channel>>,
    operator_chat: String,
}

impl Relay {
    pub fn new(channel: Arc<dyn Channel>, operator_chat: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            operator_chat: operator_chat.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            channel: None,
            operator_chat: String::new(),
        }
    }

    /// Telegram relay when both bot token and chat id are configured.
    pub fn from_config(config: &RelayConfig) -> Self {
        match config.resolved() {
            Some((token, chat_id)) => {
                info!("Telegram relay enabled");
                let channel = TelegramChannel::new(
                    TelegramConfig::new(token).with_api_base(config.api_base.clone()),
                );
                Self::new(Arc::new(channel), chat_id)
            }
            None => {
                info!("Telegram relay disabled (TG_BOT_TOKEN / TG_CHAT_ID not set)");
                Self::disabled()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }

    pub async fn send(&self, text: &str) {
        let Some(channel) = &self.channel else {
            return;
        };

        let message = OutboundMessage::html(self.operator_chat.clone(), text);
        if let Err(error) = channel.send(message).await {
            warn!(channel = channel.name(), "Failed to notify operator: {error:#}");
        }
    }

    pub async fn send_image(&self, path: &Path, caption: &str) {
        let Some(channel) = &self.channel else {
            return;
        };
        if !path.exists() {
            debug!("Skipping missing image {}", path.display());
            return;
        }

        let caption: String = caption.chars().take(MAX_CAPTION_CHARS).collect();
        if let Err(error) = channel
            .send_photo(&self.operator_chat, path, &caption)
            .await
        {
            warn!(channel = channel.name(), "Failed to send image: {error:#}");
        }
    }

    /// Position a cursor just past every update that is already pending.
    pub async fn fast_forward(&self) -> UpdateCursor {
        let mut cursor = UpdateCursor { offset: 0 };
        let Some(channel) = &self.channel else {
            return cursor;
        };

        match channel.fetch_updates(-1, Duration::ZERO).await {
            Ok(updates) => {
                if let Some(last) = updates.iter().map(|update| update.update_id).max() {
                    cursor.advance_past(last);
                }
            }
            Err(error) => warn!("Failed to skip pending updates: {error:#}"),
        }

        debug!(offset = cursor.offset, "Update cursor positioned");
        cursor
    }

    /// Wait for a `/code NNNNNN` command from the operator chat.
    ///
    /// Returns `None` when the deadline passes or the relay is unconfigured.
    pub async fn wait_for_code(
        &self,
        mut cursor: UpdateCursor,
        timeout: Duration,
    ) -> Option<OperatorCode> {
        let Some(channel) = &self.channel else {
            warn!("Telegram relay not configured, cannot receive a code");
            return None;
        };

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let long_poll = (deadline - now).min(LONG_POLL).max(MIN_LONG_POLL);

            match channel.fetch_updates(cursor.offset, long_poll).await {
                Ok(updates) => {
                    for update in updates {
                        cursor.advance_past(update.update_id);
                        let Some(message) = update.message else {
                            continue;
                        };
                        if message.chat_id != self.operator_chat {
                            debug!(chat_id = %message.chat_id, "Ignoring message from another chat");
                            continue;
                        }
                        if let Some(code) = OperatorCode::parse(&message.content) {
                            return Some(code);
                        }
                    }
                }
                Err(error) => {
                    warn!("Polling for code failed: {error:#}");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockChannel, Sent};

    const OPERATOR: &str = "4242";

    fn relay_with(mock: &Arc<MockChannel>) -> Relay {
        Relay::new(mock.clone(), OPERATOR)
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_first_matching_code_from_operator() {
        let mock = Arc::new(MockChannel::new());
        mock.push_message_at(Duration::from_secs(3), OPERATOR, "hello");
        mock.push_message_at(Duration::from_secs(5), OPERATOR, "/code 111222");
        mock.push_message_at(Duration::from_secs(6), OPERATOR, "/code 333444");
        let relay = relay_with(&mock);

        let cursor = relay.fast_forward().await;
        let code = relay.wait_for_code(cursor, Duration::from_secs(60)).await;
        assert_eq!(code.unwrap().as_str(), "111222");
    }

    #[tokio::test(start_paused = true)]
    async fn other_chats_are_never_accepted() {
        let mock = Arc::new(MockChannel::new());
        mock.push_message_at(Duration::from_secs(2), "9999", "/code 123456");
        let relay = relay_with(&mock);

        let started = Instant::now();
        let cursor = relay.fast_forward().await;
        let code = relay.wait_for_code(cursor, Duration::from_secs(30)).await;
        assert!(code.is_none());
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_before_fast_forward_is_discarded() {
        let mock = Arc::new(MockChannel::new());
        mock.push_message_at(Duration::ZERO, OPERATOR, "/code 000111");
        mock.push_message_at(Duration::ZERO, OPERATOR, "/code 000222");
        let relay = relay_with(&mock);

        let cursor = relay.fast_forward().await;
        assert_eq!(cursor.offset(), 3);
        assert!(relay.wait_for_code(cursor, Duration::from_secs(10)).await.is_none());

        mock.push_message_at(Duration::from_secs(15), OPERATOR, "/code 000333");
        let cursor = relay.fast_forward().await;
        let code = relay.wait_for_code(cursor, Duration::from_secs(10)).await;
        assert_eq!(code.unwrap().as_str(), "000333");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_back_off_until_deadline() {
        let mock = Arc::new(MockChannel::new());
        mock.fail_fetches(3);
        mock.push_message_at(Duration::from_secs(1), OPERATOR, "/code 5566778");
        let relay = relay_with(&mock);

        let cursor = UpdateCursor { offset: 0 };
        let code = relay.wait_for_code(cursor, Duration::from_secs(30)).await;
        assert_eq!(code.unwrap().as_str(), "5566778");
        assert!(mock.fetch_calls() >= 4);
    }

    #[tokio::test]
    async fn unconfigured_relay_is_inert() {
        let relay = Relay::disabled();
        assert!(!relay.is_configured());
        relay.send("ignored").await;
        let cursor = relay.fast_forward().await;
        assert_eq!(cursor.offset(), 0);
        assert!(relay.wait_for_code(cursor, Duration::from_secs(120)).await.is_none());
    }

    #[tokio::test]
    async fn send_failures_are_swallowed() {
        let mock = Arc::new(MockChannel::new());
        mock.fail_sends(true);
        let relay = relay_with(&mock);
        relay.send("<b>status</b>").await;
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn images_are_skipped_when_missing_and_captions_truncated() {
        let mock = Arc::new(MockChannel::new());
        let relay = relay_with(&mock);
        let dir = tempfile::tempdir().unwrap();

        relay.send_image(&dir.path().join("absent.png"), "nope").await;
        assert!(mock.sent().is_empty());

        let file = dir.path().join("01_shot.png");
        std::fs::write(&file, b"png").unwrap();
        relay.send_image(&file, &"é".repeat(2000)).await;

        match &mock.sent()[0] {
            Sent::Photo { chat_id, caption, .. } => {
                assert_eq!(chat_id, OPERATOR);
                assert_eq!(caption.chars().count(), 1024);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
