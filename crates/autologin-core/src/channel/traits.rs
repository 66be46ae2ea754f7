use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::types::{InboundUpdate, OutboundMessage};

/// Transport for operator messaging.
///
/// Implementations report failures; the [`Relay`](super::Relay) decides which
/// of them are fatal (none are).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel display name
    fn name(&self) -> &str;

    /// Send a message to the channel
    async fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Upload an image file with a caption.
    async fn send_photo(&self, conversation_id: &str, path: &Path, caption: &str) -> Result<()>;

    /// Fetch updates starting at `offset`, holding the request open for up to
    /// `long_poll` when nothing is pending.
    ///
    /// A negative offset addresses updates from the end of the queue
    /// (`-1` = only the latest); the server then forgets every update
    /// before the returned ones.
    async fn fetch_updates(&self, offset: i64, long_poll: Duration) -> Result<Vec<InboundUpdate>>;
}
