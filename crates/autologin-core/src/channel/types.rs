use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "HTML",
        }
    }
}

/// Outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Chat identifier
    pub conversation_id: String,
    pub content: String,
    pub parse_mode: Option<ParseMode>,
}

impl OutboundMessage {
    /// Plain-text message
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            parse_mode: None,
        }
    }

    /// Message rendered with Telegram's HTML subset
    pub fn html(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::new(conversation_id, content)
        }
    }
}

/// Text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel-specific message id (`tg_<message_id>` for Telegram)
    pub id: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
}

impl InboundMessage {
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}

/// One entry of the update feed.
///
/// Updates that carry no text message still move the read cursor, so they are
/// surfaced with `message: None` rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub message: Option<InboundMessage>,
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
