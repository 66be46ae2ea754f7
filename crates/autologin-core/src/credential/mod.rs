//! Session credential persistence.
//!
//! A freshly minted session cookie is written through to a remote secret
//! store when one is configured. Whenever that does not work out, the literal
//! value goes to the operator instead so it is never lost.

mod github;

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub use github::{GithubSecretStore, SESSION_SECRET_NAME};

use crate::channel::{Relay, escape_html};
use crate::config::SecretStoreConfig;
use crate::login::RunContext;

/// Remote key/value store for secrets.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn update_secret(&self, name: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Written to the remote store.
    Stored,
    /// Handed to the operator for a manual update.
    Relayed,
}

pub struct CredentialStore {
    backend: Option<Arc<dyn SecretBackend>>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Store without a backend; every value is relayed.
    pub fn relay_only() -> Self {
        Self { backend: None }
    }

    pub fn from_config(config: &SecretStoreConfig) -> Self {
        match config.resolved() {
            Some((token, repository)) => {
                info!("Secret auto-update enabled for {}", repository);
                Self::new(Arc::new(
                    GithubSecretStore::new(token, repository).with_api_base(config.api_base.clone()),
                ))
            }
            None => {
                warn!("Secret auto-update disabled (REPO_TOKEN / GITHUB_REPOSITORY not set)");
                Self::relay_only()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn persist(&self, value: &str, relay: &Relay, ctx: &mut RunContext) -> PersistOutcome {
        ctx.info(format!("New session cookie: {}", mask(value)));

        match self.write_through(value).await {
            Ok(()) => {
                ctx.success(format!("{SESSION_SECRET_NAME} updated automatically"));
                relay
                    .send(&format!(
                        "🔑 <b>Cookie updated automatically</b>\n\n{SESSION_SECRET_NAME} has been refreshed"
                    ))
                    .await;
                PersistOutcome::Stored
            }
            Err(error) => {
                ctx.warn(format!("Automatic update unavailable: {error:#}"));
                if !relay.is_configured() {
                    ctx.error("No relay configured, the new cookie could not be delivered");
                    return PersistOutcome::Relayed;
                }
                relay
                    .send(&format!(
                        "🔑 <b>New cookie</b>\n\nPlease update the {SESSION_SECRET_NAME} secret manually:\n<code>{}</code>",
                        escape_html(value)
                    ))
                    .await;
                ctx.success("New cookie sent to the operator");
                PersistOutcome::Relayed
            }
        }
    }

    async fn write_through(&self, value: &str) -> Result<()> {
        let Some(backend) = &self.backend else {
            bail!("no secret store configured");
        };
        info!("Updating {} via {}", SESSION_SECRET_NAME, backend.name());
        backend.update_secret(SESSION_SECRET_NAME, value).await
    }
}

/// `first15...last8`; short values are hidden entirely.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 23 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..15].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{head}...{tail}")
}
