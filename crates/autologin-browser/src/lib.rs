//! Browser capability layer for autologin.
//!
//! The login state machine never talks to a browser directly. It drives a
//! [`BrowserPage`], a narrow page-level contract that covers exactly what the
//! flow needs:
//! - Navigation, reload and load-state waits
//! - Locating the first visible element out of a list of selector candidates
//! - Clicking, filling and pressing keys
//! - Screenshots and cookie jar access
//!
//! [`PlaywrightPage`] implements the contract by running a long-lived Node.js
//! Playwright process and exchanging line-delimited JSON commands with it.

mod playwright;
mod probe;
mod runner;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use playwright::PlaywrightPage;
pub use probe::{RuntimeProbe, probe_runtime};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

impl Cookie {
    /// Cookie scoped to `domain` with path `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_cookie_path(),
            http_only: None,
            secure: None,
        }
    }
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub headless: bool,
    pub args: Vec<String>,
    pub viewport: Viewport,
    pub user_agent: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            args: vec!["--no-sandbox".to_string()],
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl LaunchOptions {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

/// Page-level browser capability consumed by the login flow.
///
/// Selectors use Playwright selector syntax (`button:has-text("GitHub")`,
/// `input[name="otp"]`, ...). Every call is bounded by the timeout passed in
/// or by the implementation's own default.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Wait for the network to go idle.
    async fn wait_for_stable(&self, timeout: Duration) -> Result<()>;

    /// Wait for the DOM content to be loaded.
    async fn wait_for_dom(&self, timeout: Duration) -> Result<()>;

    /// Return the first selector whose first match becomes visible within
    /// `per_selector` time, trying candidates in order.
    async fn find_first_visible(
        &self,
        selectors: &[&str],
        per_selector: Duration,
    ) -> Result<Option<String>>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn text_of(&self, selector: &str) -> Result<String>;

    async fn press_enter(&self) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn reload(&self, timeout: Duration) -> Result<()>;

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Cookies whose domain contains `domain`.
    async fn cookies_of(&self, domain: &str) -> Result<Vec<Cookie>>;

    /// Release the page and its browser. Idempotent.
    async fn close(&self) -> Result<()>;
}
