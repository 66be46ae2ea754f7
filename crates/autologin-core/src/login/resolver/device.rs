use anyhow::Result;
use async_trait::async_trait;
use autologin_browser::BrowserPage;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::ChallengeResolver;
use crate::channel::Relay;
use crate::login::challenge::{ChallengeKind, ChallengeOutcome};
use crate::login::context::RunContext;
use crate::login::provider;

const TICK: Duration = Duration::from_secs(1);
/// Ticks between URL checks and soft reloads.
const CHECK_EVERY: u64 = 5;
const RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// New-device confirmation by email link or the GitHub app.
pub struct DeviceApproval {
    pub window: Duration,
}

#[async_trait]
impl ChallengeResolver for DeviceApproval {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::DeviceApproval
    }

    async fn resolve(
        &self,
        page: &dyn BrowserPage,
        relay: &Relay,
        ctx: &mut RunContext,
    ) -> Result<ChallengeOutcome> {
        let secs = self.window.as_secs();
        ctx.warn(format!("Device verification required, waiting {secs}s"));
        let shot = ctx.capture(page, "device_verification").await;

        relay
            .send(&format!(
                "⚠️ <b>Device verification required</b>\n\nApprove within {secs}s:\n1️⃣ Check your email and click the link\n2️⃣ Or approve in the GitHub app"
            ))
            .await;
        if let Some(path) = &shot {
            relay.send_image(path, "device verification page").await;
        }

        for tick in 0..secs {
            if tick % CHECK_EVERY == 0 {
                ctx.info(format!("  waiting... ({tick}/{secs}s)"));
                let url = page.current_url().await?;
                if !provider::is_device_verification(&url) {
                    ctx.success("Device verification passed");
                    relay.send("✅ <b>Device verification passed</b>").await;
                    return Ok(ChallengeOutcome::Resolved);
                }
                match page.reload(RELOAD_TIMEOUT).await {
                    Ok(()) => {
                        if let Err(error) = page.wait_for_stable(RELOAD_TIMEOUT).await {
                            debug!("Page did not settle after reload: {error:#}");
                        }
                    }
                    Err(error) => debug!("Soft reload failed: {error:#}"),
                }
            }
            sleep(TICK).await;
        }

        // Approval may land between the last check and the deadline.
        let url = page.current_url().await?;
        if !provider::is_device_verification(&url) {
            ctx.success("Device verification passed");
            return Ok(ChallengeOutcome::Resolved);
        }

        ctx.error("Device verification timed out");
        relay.send("❌ <b>Device verification timed out</b>").await;
        Ok(ChallengeOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockChannel, ScriptedPage};
    use std::sync::Arc;
    use tokio::time::Instant;

    const DEVICE_URL: &str = "https://github.com/sessions/verified-device";

    fn resolver() -> DeviceApproval {
        DeviceApproval {
            window: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn approval_is_noticed_on_a_check_tick() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(DEVICE_URL)
            .url_at(Duration::from_secs(12), "https://github.com/login/oauth/authorize?x=1");
        let channel = Arc::new(MockChannel::new());
        let relay = Relay::new(channel.clone(), "1");
        let mut ctx = RunContext::new("octocat", dir.path());

        let started = Instant::now();
        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Resolved);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(page.reloads(), 3);
        assert!(channel.sent_texts().iter().any(|text| text.contains("passed")));
    }

    #[tokio::test(start_paused = true)]
    async fn url_change_right_before_deadline_counts_as_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(DEVICE_URL)
            .url_at(Duration::from_secs(27), "https://github.com/login/oauth/authorize?x=1");
        let relay = Relay::disabled();
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();
        assert_eq!(outcome, ChallengeOutcome::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn still_pending_at_deadline_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(DEVICE_URL);
        let channel = Arc::new(MockChannel::new());
        let relay = Relay::new(channel.clone(), "1");
        let mut ctx = RunContext::new("octocat", dir.path());

        let started = Instant::now();
        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(page.reloads(), 6);
        assert!(channel.sent_texts().last().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_on_device_verification_path_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new("https://github.com/login/device-verification");
        let relay = Relay::disabled();
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();
        assert_eq!(outcome, ChallengeOutcome::TimedOut);
    }
}
