use chrono::{DateTime, Local};

use super::context::RunContext;
use crate::channel::{Relay, escape_html};
use crate::error::LoginError;

const TITLE: &str = "🤖 ClawCloud auto-login";
const REPORT_LOG_LINES: usize = 6;
const FAILURE_CAPTURES: usize = 3;

/// Render the final status message (Telegram HTML).
pub fn compose(ctx: &RunContext, error: Option<&LoginError>, at: DateTime<Local>) -> String {
    let status = if error.is_none() { "✅ Success" } else { "❌ Failed" };

    let mut message = format!(
        "<b>{TITLE}</b>\n\n<b>Status:</b> {status}\n<b>User:</b> {}\n<b>Time:</b> {}",
        escape_html(ctx.username()),
        at.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(error) = error {
        message.push_str(&format!("\n<b>Error:</b> {}", escape_html(&error.summary())));
    }

    let lines = ctx.recent_lines(REPORT_LOG_LINES);
    if !lines.is_empty() {
        message.push_str("\n\n<b>Log:</b>\n");
        message.push_str(&escape_html(&lines.join("\n")));
    }
    message
}

/// Emit the one report of a run, with evidence attached.
pub async fn send_report(relay: &Relay, ctx: &RunContext, error: Option<&LoginError>) {
    relay.send(&compose(ctx, error, Local::now())).await;

    if error.is_some() {
        for path in ctx.recent_captures(FAILURE_CAPTURES) {
            let caption = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            relay.send_image(path, &caption).await;
        }
    } else if let Some(path) = ctx.captures().last() {
        relay.send_image(path, "done").await;
    }
}
