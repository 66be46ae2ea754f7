//! Out-of-band operator channel.
//!
//! [`Channel`] is the transport (Telegram Bot API in production, a mock in
//! tests). [`Relay`] is what the login flow talks to: best-effort
//! notifications and the `/code` wait.

mod code;
mod relay;
mod telegram;
mod traits;
mod types;

pub use code::OperatorCode;
pub use relay::{Relay, UpdateCursor};
pub use telegram::{TelegramChannel, TelegramConfig};
pub use traits::Channel;
pub use types::{InboundMessage, InboundUpdate, OutboundMessage, ParseMode, escape_html};
