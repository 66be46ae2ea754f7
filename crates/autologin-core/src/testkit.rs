//! In-process fakes for exercising the login flow without a browser or
//! network: a [`ScriptedPage`] whose URL follows a script, and a
//! [`MockChannel`] that emulates Telegram's update feed on the tokio clock.
//!
//! Both are meant for `#[tokio::test(start_paused = true)]`.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use autologin_browser::{BrowserPage, Cookie};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

use crate::channel::{Channel, InboundMessage, InboundUpdate, OutboundMessage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Page
// ============================================================================

/// Effect of an interaction on the scripted page.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    url: Option<String>,
    delay: Duration,
    show: Vec<String>,
    hide: Vec<String>,
}

impl Transition {
    pub fn to(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Apply the URL change `delay` after the interaction.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn show(mut self, selector: impl Into<String>) -> Self {
        self.show.push(selector.into());
        self
    }

    pub fn hide(mut self, selector: impl Into<String>) -> Self {
        self.hide.push(selector.into());
        self
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    scheduled: Vec<(Instant, String)>,
    landings: HashMap<String, String>,
    failing_navigations: HashSet<String>,
    visible: HashSet<String>,
    on_click: HashMap<String, Transition>,
    on_enter: Option<Transition>,
    texts: HashMap<String, String>,
    cookies: Vec<Cookie>,
    fail_screenshots: bool,
    fail_cookies: bool,

    navigations: Vec<String>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    added_cookies: Vec<Cookie>,
    screenshots: Vec<PathBuf>,
    reloads: usize,
    enters: usize,
}

impl PageState {
    fn apply_due(&mut self, now: Instant) {
        self.scheduled.sort_by_key(|(at, _)| *at);
        while let Some((at, _)) = self.scheduled.first() {
            if *at > now {
                break;
            }
            let (_, url) = self.scheduled.remove(0);
            self.url = url;
        }
    }

    fn apply(&mut self, transition: &Transition, now: Instant) {
        for selector in &transition.hide {
            self.visible.remove(selector);
        }
        for selector in &transition.show {
            self.visible.insert(selector.clone());
        }
        if let Some(url) = &transition.url {
            if transition.delay.is_zero() {
                self.url = url.clone();
            } else {
                self.scheduled.push((now + transition.delay, url.clone()));
            }
        }
    }
}

/// Fake [`BrowserPage`] driven by a script of URL changes and element rules.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// run owns the other.
#[derive(Clone)]
pub struct ScriptedPage {
    started: Instant,
    state: Arc<Mutex<PageState>>,
    close_calls: Arc<AtomicUsize>,
}

impl ScriptedPage {
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            state: Arc::new(Mutex::new(PageState {
                url: initial_url.into(),
                ..PageState::default()
            })),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Navigating to `url` lands on `landing` (a server-side redirect).
    pub fn redirect(self, url: impl Into<String>, landing: impl Into<String>) -> Self {
        self.state().landings.insert(url.into(), landing.into());
        self
    }

    pub fn failing_navigation(self, url: impl Into<String>) -> Self {
        self.state().failing_navigations.insert(url.into());
        self
    }

    /// Change the URL `delay` after the page was created.
    pub fn url_at(self, delay: Duration, url: impl Into<String>) -> Self {
        let at = self.started + delay;
        self.state().scheduled.push((at, url.into()));
        self
    }

    pub fn visible(self, selector: impl Into<String>) -> Self {
        self.state().visible.insert(selector.into());
        self
    }

    pub fn on_click(self, selector: impl Into<String>, transition: Transition) -> Self {
        let selector = selector.into();
        {
            let mut state = self.state();
            state.visible.insert(selector.clone());
            state.on_click.insert(selector, transition);
        }
        self
    }

    pub fn on_enter(self, transition: Transition) -> Self {
        self.state().on_enter = Some(transition);
        self
    }

    pub fn text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.state().texts.insert(selector.into(), text.into());
        self
    }

    pub fn with_cookie(self, cookie: Cookie) -> Self {
        self.state().cookies.push(cookie);
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.state().fail_screenshots = true;
        self
    }

    pub fn failing_cookies(self) -> Self {
        self.state().fail_cookies = true;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state().fills.clone()
    }

    pub fn added_cookies(&self) -> Vec<Cookie> {
        self.state().added_cookies.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state().reloads
    }

    pub fn enters(&self) -> usize {
        self.state().enters
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        lock(&*self.state)
    }

    fn ensure_visible(state: &PageState, selector: &str) -> Result<()> {
        if state.visible.contains(selector) {
            Ok(())
        } else {
            Err(anyhow!("Timeout waiting for locator('{selector}') to be visible"))
        }
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        if state.failing_navigations.contains(url) {
            bail!("net::ERR_CONNECTION_RESET at {url}");
        }
        let landing = state
            .landings
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        state.url = landing;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let mut state = self.state();
        state.apply_due(Instant::now());
        Ok(state.url.clone())
    }

    async fn wait_for_stable(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_dom(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn find_first_visible(
        &self,
        selectors: &[&str],
        _per_selector: Duration,
    ) -> Result<Option<String>> {
        let state = self.state();
        Ok(selectors
            .iter()
            .find(|selector| state.visible.contains(**selector))
            .map(|selector| selector.to_string()))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state();
        Self::ensure_visible(&state, selector)?;
        state.clicks.push(selector.to_string());
        if let Some(transition) = state.on_click.get(selector).cloned() {
            state.apply(&transition, Instant::now());
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        Self::ensure_visible(&state, selector)?;
        state.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn text_of(&self, selector: &str) -> Result<String> {
        let state = self.state();
        Self::ensure_visible(&state, selector)?;
        Ok(state.texts.get(selector).cloned().unwrap_or_default())
    }

    async fn press_enter(&self) -> Result<()> {
        let mut state = self.state();
        state.enters += 1;
        if let Some(transition) = state.on_enter.clone() {
            state.apply(&transition, Instant::now());
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if state.fail_screenshots {
            bail!("screenshot failed: target closed");
        }
        std::fs::write(path, b"\x89PNG scripted")?;
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        self.state().reloads += 1;
        Ok(())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let mut state = self.state();
        state.added_cookies.extend_from_slice(cookies);
        state.cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn cookies_of(&self, domain: &str) -> Result<Vec<Cookie>> {
        let state = self.state();
        if state.fail_cookies {
            bail!("browser context closed");
        }
        Ok(state
            .cookies
            .iter()
            .filter(|cookie| cookie.domain.contains(domain))
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Something the mock channel delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: String, text: String },
    Photo { chat_id: String, file_name: String, caption: String },
}

impl Sent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text.as_str()),
            Self::Photo { .. } => None,
        }
    }
}

struct QueuedUpdate {
    arrives_at: Instant,
    update: InboundUpdate,
}

/// Telegram-like channel whose updates arrive on a schedule.
///
/// `fetch_updates` honours offsets like `getUpdates`: negative offsets
/// return only the newest arrived update, others hold the call open until an
/// update arrives or the long poll expires.
pub struct MockChannel {
    started: Instant,
    sent: Mutex<Vec<Sent>>,
    queue: Mutex<Vec<QueuedUpdate>>,
    next_update_id: AtomicUsize,
    fail_sends: AtomicBool,
    failing_fetches: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sent: Mutex::new(Vec::new()),
            queue: Mutex::new(Vec::new()),
            next_update_id: AtomicUsize::new(1),
            fail_sends: AtomicBool::new(false),
            failing_fetches: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a text message that arrives `delay` after the channel was
    /// created. Returns its update id.
    pub fn push_message_at(&self, delay: Duration, chat_id: &str, text: &str) -> i64 {
        let update_id = self.next_update_id.fetch_add(1, Ordering::SeqCst) as i64;
        let message = InboundMessage::new(
            format!("tg_{update_id}"),
            chat_id,
            chat_id,
            text,
        );
        lock(&self.queue).push(QueuedUpdate {
            arrives_at: self.started + delay,
            update: InboundUpdate {
                update_id,
                message: Some(message),
            },
        });
        update_id
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` fetches fail.
    pub fn fail_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|sent| sent.text().map(str::to_string))
            .collect()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn arrived_from(&self, offset: i64, now: Instant) -> Vec<InboundUpdate> {
        lock(&self.queue)
            .iter()
            .filter(|queued| queued.arrives_at <= now && queued.update.update_id >= offset)
            .map(|queued| queued.update.clone())
            .collect()
    }

    fn next_arrival(&self, offset: i64) -> Option<Instant> {
        lock(&self.queue)
            .iter()
            .filter(|queued| queued.update.update_id >= offset)
            .map(|queued| queued.arrives_at)
            .min()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("mock send failure");
        }
        lock(&self.sent).push(Sent::Text {
            chat_id: message.conversation_id,
            text: message.content,
        });
        Ok(())
    }

    async fn send_photo(&self, conversation_id: &str, path: &Path, caption: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("mock send failure");
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        lock(&self.sent).push(Sent::Photo {
            chat_id: conversation_id.to_string(),
            file_name,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn fetch_updates(&self, offset: i64, long_poll: Duration) -> Result<Vec<InboundUpdate>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            bail!("mock fetch failure");
        }

        let now = Instant::now();
        if offset < 0 {
            return Ok(self.arrived_from(0, now).into_iter().last().into_iter().collect());
        }

        let arrived = self.arrived_from(offset, now);
        if !arrived.is_empty() || long_poll.is_zero() {
            return Ok(arrived);
        }

        let expires = now + long_poll;
        let wake = self
            .next_arrival(offset)
            .map_or(expires, |arrival| arrival.min(expires));
        sleep_until(wake).await;
        Ok(self.arrived_from(offset, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scripted_url_follows_timeline() {
        let page = ScriptedPage::new("https://a.test/").url_at(Duration::from_secs(5), "https://b.test/");
        assert_eq!(page.current_url().await.unwrap(), "https://a.test/");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(page.current_url().await.unwrap(), "https://b.test/");
    }

    #[tokio::test(start_paused = true)]
    async fn click_applies_delayed_transition() {
        let page = ScriptedPage::new("https://a.test/")
            .on_click("#go", Transition::to("https://c.test/").after(Duration::from_secs(2)).hide("#go"));

        page.click("#go").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://a.test/");
        assert!(page.click("#go").await.is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(page.current_url().await.unwrap(), "https://c.test/");
    }

    #[tokio::test(start_paused = true)]
    async fn mock_channel_holds_long_poll_until_arrival() {
        let channel = MockChannel::new();
        channel.push_message_at(Duration::from_secs(7), "1", "hi");

        let started = Instant::now();
        let updates = channel.fetch_updates(0, Duration::from_secs(20)).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(7));

        let latest = channel.fetch_updates(-1, Duration::ZERO).await.unwrap();
        assert_eq!(latest[0].update_id, 1);
    }
}
