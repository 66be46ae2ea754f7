//! Run configuration.
//!
//! Everything is plain data; the CLI fills it from flags and environment
//! variables and the login run validates what it needs before the browser is
//! launched.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LoginError, Result};

pub const DEFAULT_TARGET_URL: &str = "https://ap-northeast-1.run.claw.cloud";
pub const DEFAULT_TARGET_DOMAIN: &str = "claw.cloud";
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// The application being signed into.
#[derive(Debug, Clone)]
pub struct TargetSite {
    pub base_url: String,
    pub domain: String,
}

impl Default for TargetSite {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TARGET_URL.to_string(),
            domain: DEFAULT_TARGET_DOMAIN.to_string(),
        }
    }
}

impl TargetSite {
    pub fn new(base_url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            domain: domain.into(),
        }
    }

    pub fn signin_url(&self) -> String {
        self.page_url("/signin")
    }

    pub fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn is_signin_url(url: &str) -> bool {
        url.to_lowercase().contains("signin")
    }

    /// On the target domain and past its sign-in page.
    pub fn is_authenticated_url(&self, url: &str) -> bool {
        url.contains(&self.domain) && !Self::is_signin_url(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub device_verify: Duration,
    pub two_factor: Duration,
    /// One-second iterations spent waiting for the OAuth redirect.
    pub redirect_attempts: u32,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            device_verify: Duration::from_secs(30),
            two_factor: Duration::from_secs(120),
            redirect_attempts: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Previously persisted GitHub `user_session` cookie.
    pub session_cookie: Option<String>,
    pub target: TargetSite,
    pub waits: WaitSettings,
    pub capture_dir: PathBuf,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            session_cookie: None,
            target: TargetSite::default(),
            waits: WaitSettings::default(),
            capture_dir: PathBuf::from("."),
        }
    }
}

/// Validated username/password pair.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginConfig {
    pub fn credentials(&self) -> Result<Credentials> {
        let username = non_empty(self.username.as_deref());
        // Passwords may legitimately start or end with spaces.
        let password = self
            .password
            .as_deref()
            .filter(|value| !value.trim().is_empty());

        match (username, password) {
            (Some(username), Some(password)) => Ok(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, None) => Err(LoginError::ConfigurationMissing(
                "GH_USERNAME and GH_PASSWORD".to_string(),
            )),
            (None, Some(_)) => Err(LoginError::ConfigurationMissing("GH_USERNAME".to_string())),
            (Some(_), None) => Err(LoginError::ConfigurationMissing("GH_PASSWORD".to_string())),
        }
    }

    pub fn session_cookie(&self) -> Option<&str> {
        non_empty(self.session_cookie.as_deref())
    }
}

/// Telegram bot used to reach the operator.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Token and chat id, when both are present.
    pub fn resolved(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(self.bot_token.as_deref())?,
            non_empty(self.chat_id.as_deref())?,
        ))
    }
}

/// Repository whose Actions secret receives the refreshed session cookie.
#[derive(Debug, Clone)]
pub struct SecretStoreConfig {
    pub token: Option<String>,
    pub repository: Option<String>,
    pub api_base: String,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            token: None,
            repository: None,
            api_base: GITHUB_API_BASE.to_string(),
        }
    }
}

impl SecretStoreConfig {
    pub fn resolved(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(self.token.as_deref())?,
            non_empty(self.repository.as_deref())?,
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
