use autologin_browser::BrowserPage;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::challenge::ChallengeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
    Step,
}

impl LogLevel {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Success => "✅",
            Self::Warn => "⚠️",
            Self::Error => "❌",
            Self::Step => "🔹",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// Time-stamped, icon-prefixed line as it appears in the report.
    pub fn line(&self) -> String {
        format!(
            "{} {} {}",
            self.at.format("%H:%M:%S"),
            self.level.icon(),
            self.message
        )
    }
}

/// Per-run accumulation of log lines, evidence screenshots and the
/// challenges met on the way.
#[derive(Debug)]
pub struct RunContext {
    username: String,
    capture_dir: PathBuf,
    logs: Vec<LogEntry>,
    captures: Vec<PathBuf>,
    capture_counter: u32,
    challenges: Vec<ChallengeKind>,
}

impl RunContext {
    pub fn new(username: impl Into<String>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            capture_dir: capture_dir.into(),
            logs: Vec::new(),
            captures: Vec::new(),
            capture_counter: 0,
            challenges: Vec::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            _ => info!("{} {}", level.icon(), message),
        }
        self.logs.push(LogEntry {
            at: Local::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn step(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Step, message);
    }

    /// Screenshot the page as `NN_<name>.png`.
    ///
    /// The counter advances even when the screenshot fails; failures are
    /// logged and leave no capture behind.
    pub async fn capture(&mut self, page: &dyn BrowserPage, name: &str) -> Option<PathBuf> {
        self.capture_counter += 1;
        let path = self
            .capture_dir
            .join(format!("{:02}_{}.png", self.capture_counter, name));

        match page.screenshot(&path).await {
            Ok(()) => {
                self.captures.push(path.clone());
                Some(path)
            }
            Err(error) => {
                warn!("Screenshot {} failed: {:#}", path.display(), error);
                None
            }
        }
    }

    pub fn record_challenge(&mut self, kind: ChallengeKind) {
        self.challenges.push(kind);
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn captures(&self) -> &[PathBuf] {
        &self.captures
    }

    pub fn challenges(&self) -> &[ChallengeKind] {
        &self.challenges
    }

    /// The last `count` log lines, oldest first.
    pub fn recent_lines(&self, count: usize) -> Vec<String> {
        let skip = self.logs.len().saturating_sub(count);
        self.logs[skip..].iter().map(LogEntry::line).collect()
    }

    /// The last `count` captures, oldest first.
    pub fn recent_captures(&self, count: usize) -> &[PathBuf] {
        let skip = self.captures.len().saturating_sub(count);
        &self.captures[skip..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedPage;

    #[tokio::test]
    async fn captures_are_numbered_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new("about:blank");
        let mut ctx = RunContext::new("octocat", dir.path());

        let first = ctx.capture(&page, "target").await.unwrap();
        let second = ctx.capture(&page, "github_login").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "01_target.png");
        assert_eq!(second.file_name().unwrap(), "02_github_login.png");
        assert!(second.exists());
        assert_eq!(ctx.captures().len(), 2);
    }

    #[tokio::test]
    async fn failed_capture_still_advances_counter() {
        let dir = tempfile::tempdir().unwrap();
        let broken = ScriptedPage::new("about:blank").failing_screenshots();
        let page = ScriptedPage::new("about:blank");
        let mut ctx = RunContext::new("octocat", dir.path());

        assert!(ctx.capture(&broken, "lost").await.is_none());
        let next = ctx.capture(&page, "kept").await.unwrap();
        assert_eq!(next.file_name().unwrap(), "02_kept.png");
        assert_eq!(ctx.captures().len(), 1);
    }

    #[test]
    fn recent_lines_keep_order_and_icons() {
        let mut ctx = RunContext::new("octocat", ".");
        for index in 0..8 {
            ctx.info(format!("line {index}"));
        }
        ctx.step("last");

        let lines = ctx.recent_lines(6);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with(" ℹ️ line 3"), "{}", lines[0]);
        assert!(lines[5].ends_with(" 🔹 last"), "{}", lines[5]);
        assert_eq!(lines[0].as_bytes()[2], b':');
    }
}
