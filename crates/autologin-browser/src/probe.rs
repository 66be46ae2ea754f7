use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Availability of the pieces the Playwright bridge needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeProbe {
    pub node_available: bool,
    pub node_version: Option<String>,
    pub playwright_package_available: bool,
    pub chromium_cache_detected: bool,
    pub ready: bool,
    pub notes: Vec<String>,
}

impl RuntimeProbe {
    fn empty() -> Self {
        Self {
            node_available: false,
            node_version: None,
            playwright_package_available: false,
            chromium_cache_detected: false,
            ready: false,
            notes: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.ready = self.node_available && self.playwright_package_available;

        if !self.node_available {
            self.notes
                .push("Node.js not found. Install Node.js 20+ to drive the browser.".to_string());
        }

        if self.node_available && !self.playwright_package_available {
            self.notes
                .push("Playwright npm package not found. Run: npm i playwright".to_string());
        }

        if self.ready && !self.chromium_cache_detected {
            self.notes.push(
                "Chromium browser binary not found in Playwright cache. Run: npx playwright install chromium".to_string(),
            );
        }

        self
    }
}

pub async fn probe_runtime() -> Result<RuntimeProbe> {
    let mut probe = RuntimeProbe::empty();

    if let Ok(output) = run_command_capture("node", &["--version"], 10).await
        && output.exit_code == 0
    {
        probe.node_available = true;
        probe.node_version = Some(output.stdout.trim().to_string());
    }

    if probe.node_available {
        probe.playwright_package_available = run_command_capture(
            "node",
            &[
                "--input-type=module",
                "-e",
                "import('playwright').then(() => process.exit(0)).catch(() => process.exit(1));",
            ],
            15,
        )
        .await
        .map(|output| output.exit_code == 0)
        .unwrap_or(false);
    }

    probe.chromium_cache_detected = detect_chromium_cache();
    Ok(probe.finish())
}

struct CommandCapture {
    exit_code: i32,
    stdout: String,
}

async fn run_command_capture(
    program: &str,
    args: &[&str],
    timeout_secs: u64,
) -> Result<CommandCapture> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(Duration::from_secs(timeout_secs), command.output()).await {
        Ok(result) => result?,
        Err(_) => bail!("Command timed out after {} seconds", timeout_secs),
    };

    Ok(CommandCapture {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    })
}

fn detect_chromium_cache() -> bool {
    if let Ok(path) = std::env::var("PLAYWRIGHT_BROWSERS_PATH")
        && PathBuf::from(path).exists()
    {
        return true;
    }

    let mut candidates = Vec::new();

    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(&home).join(".cache/ms-playwright"));
        candidates.push(PathBuf::from(&home).join("Library/Caches/ms-playwright"));
    }

    if let Ok(user_profile) = std::env::var("USERPROFILE") {
        candidates.push(PathBuf::from(user_profile).join("AppData/Local/ms-playwright"));
    }

    candidates.into_iter().any(|path| path.exists())
}
