use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::runner::{BridgeReply, READY_ID, build_bridge_runner, parse_reply_line};
use crate::{BrowserPage, Cookie, LaunchOptions};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Added to the page-level timeout to bound a whole bridge round trip.
const ROUND_TRIP_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Navigate {
        url: &'a str,
        timeout_ms: u64,
    },
    CurrentUrl,
    WaitForLoadState {
        state: &'a str,
        timeout_ms: u64,
    },
    FindFirstVisible {
        selectors: &'a [&'a str],
        timeout_ms: u64,
    },
    Click {
        selector: &'a str,
        timeout_ms: u64,
    },
    Fill {
        selector: &'a str,
        value: &'a str,
        timeout_ms: u64,
    },
    InnerText {
        selector: &'a str,
        timeout_ms: u64,
    },
    Press {
        key: &'a str,
    },
    Screenshot {
        path: String,
        timeout_ms: u64,
    },
    Reload {
        timeout_ms: u64,
    },
    AddCookies {
        cookies: &'a [Cookie],
    },
    Cookies,
    Close,
}

impl BridgeCommand<'_> {
    fn op(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::CurrentUrl => "current_url",
            Self::WaitForLoadState { .. } => "wait_for_load_state",
            Self::FindFirstVisible { .. } => "find_first_visible",
            Self::Click { .. } => "click",
            Self::Fill { .. } => "fill",
            Self::InnerText { .. } => "inner_text",
            Self::Press { .. } => "press",
            Self::Screenshot { .. } => "screenshot",
            Self::Reload { .. } => "reload",
            Self::AddCookies { .. } => "add_cookies",
            Self::Cookies => "cookies",
            Self::Close => "close",
        }
    }

    /// Upper bound for the whole round trip of this command.
    fn deadline(&self) -> Duration {
        let page_timeout = match self {
            Self::Navigate { timeout_ms, .. }
            | Self::WaitForLoadState { timeout_ms, .. }
            | Self::Click { timeout_ms, .. }
            | Self::Fill { timeout_ms, .. }
            | Self::InnerText { timeout_ms, .. }
            | Self::Screenshot { timeout_ms, .. }
            | Self::Reload { timeout_ms } => Duration::from_millis(*timeout_ms),
            Self::FindFirstVisible {
                selectors,
                timeout_ms,
            } => Duration::from_millis(*timeout_ms) * selectors.len().max(1) as u32,
            _ => ACTION_TIMEOUT,
        };
        page_timeout + ROUND_TRIP_SLACK
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn reply_message(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl BridgeProcess {
    async fn read_reply(&mut self, id: u64) -> Result<BridgeReply> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                bail!("Playwright bridge exited unexpectedly");
            };

            match parse_reply_line(&line) {
                Some(reply) if reply.id == id => return Ok(reply),
                Some(reply) => debug!(id = reply.id, "dropping stale bridge reply"),
                None => debug!(target: "autologin_browser::node", "{}", line),
            }
        }
    }
}

/// [`BrowserPage`] backed by a Node.js Playwright process.
///
/// The child is spawned with `kill_on_drop`, so dropping the page releases
/// the browser even when [`BrowserPage::close`] was never reached.
pub struct PlaywrightPage {
    process: Mutex<BridgeProcess>,
    next_id: AtomicU64,
    closed: AtomicBool,
    _workdir: tempfile::TempDir,
}

impl PlaywrightPage {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("autologin-bridge-")
            .tempdir()?;
        let script_path = workdir.path().join("bridge.mjs");
        std::fs::write(&script_path, build_bridge_runner(options)?)?;

        let mut child = Command::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .context("failed to start node for the Playwright bridge")?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Playwright bridge stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Playwright bridge stdout unavailable"))?;

        let mut process = BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let ready = timeout(LAUNCH_TIMEOUT, process.read_reply(READY_ID))
            .await
            .map_err(|_| {
                anyhow!(
                    "Playwright bridge did not start within {} seconds",
                    LAUNCH_TIMEOUT.as_secs()
                )
            })??;
        if !ready.ok {
            bail!(
                "Playwright bridge failed to start: {}",
                reply_message(&ready.value)
            );
        }

        info!(headless = options.headless, "browser launched");

        Ok(Self {
            process: Mutex::new(process),
            next_id: AtomicU64::new(READY_ID + 1),
            closed: AtomicBool::new(false),
            _workdir: workdir,
        })
    }

    async fn call(&self, command: BridgeCommand<'_>) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("browser page is closed");
        }
        self.round_trip(&command).await
    }

    async fn round_trip(&self, command: &BridgeCommand<'_>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&Envelope { id, command })?;
        line.push('\n');

        let mut process = self.process.lock().await;
        process.stdin.write_all(line.as_bytes()).await?;
        process.stdin.flush().await?;

        let reply = timeout(command.deadline(), process.read_reply(id))
            .await
            .map_err(|_| anyhow!("browser command `{}` timed out", command.op()))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            bail!("{} failed: {}", command.op(), reply_message(&reply.value))
        }
    }
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.call(BridgeCommand::Navigate {
            url,
            timeout_ms: millis(timeout),
        })
        .await
        .map(|_| ())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.call(BridgeCommand::CurrentUrl).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("current_url returned a non-string value"))
    }

    async fn wait_for_stable(&self, timeout: Duration) -> Result<()> {
        self.call(BridgeCommand::WaitForLoadState {
            state: "networkidle",
            timeout_ms: millis(timeout),
        })
        .await
        .map(|_| ())
    }

    async fn wait_for_dom(&self, timeout: Duration) -> Result<()> {
        self.call(BridgeCommand::WaitForLoadState {
            state: "domcontentloaded",
            timeout_ms: millis(timeout),
        })
        .await
        .map(|_| ())
    }

    async fn find_first_visible(
        &self,
        selectors: &[&str],
        per_selector: Duration,
    ) -> Result<Option<String>> {
        let value = self
            .call(BridgeCommand::FindFirstVisible {
                selectors,
                timeout_ms: millis(per_selector),
            })
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.call(BridgeCommand::Click {
            selector,
            timeout_ms: millis(ACTION_TIMEOUT),
        })
        .await
        .map(|_| ())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.call(BridgeCommand::Fill {
            selector,
            value,
            timeout_ms: millis(ACTION_TIMEOUT),
        })
        .await
        .map(|_| ())
    }

    async fn text_of(&self, selector: &str) -> Result<String> {
        let value = self
            .call(BridgeCommand::InnerText {
                selector,
                timeout_ms: millis(ACTION_TIMEOUT),
            })
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn press_enter(&self) -> Result<()> {
        self.call(BridgeCommand::Press { key: "Enter" })
            .await
            .map(|_| ())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.call(BridgeCommand::Screenshot {
            path: path.display().to_string(),
            timeout_ms: millis(Duration::from_secs(30)),
        })
        .await
        .map(|_| ())
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        self.call(BridgeCommand::Reload {
            timeout_ms: millis(timeout),
        })
        .await
        .map(|_| ())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.call(BridgeCommand::AddCookies { cookies })
            .await
            .map(|_| ())
    }

    async fn cookies_of(&self, domain: &str) -> Result<Vec<Cookie>> {
        let value = self.call(BridgeCommand::Cookies).await?;
        let cookies: Vec<Cookie> = serde_json::from_value(value)?;
        Ok(cookies
            .into_iter()
            .filter(|cookie| cookie.domain.contains(domain))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.round_trip(&BridgeCommand::Close).await {
            warn!("Playwright bridge did not acknowledge close: {}", e);
        }

        let mut process = self.process.lock().await;
        match timeout(CLOSE_TIMEOUT, process.child.wait()).await {
            Ok(status) => {
                debug!(status = ?status.ok(), "Playwright bridge exited");
            }
            Err(_) => {
                warn!("Playwright bridge still running after close, killing it");
                process.child.kill().await?;
            }
        }

        info!("browser released");
        Ok(())
    }
}
