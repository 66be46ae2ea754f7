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
const PROGRESS_EVERY: u64 = 10;
const RELOAD_EVERY: u64 = 30;
const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Approval prompt pushed to GitHub Mobile; the page shows the number to
/// match, so fresh screenshots go to the operator while waiting.
pub struct MobilePush {
    pub window: Duration,
}

#[async_trait]
impl ChallengeResolver for MobilePush {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::MobilePush
    }

    async fn resolve(
        &self,
        page: &dyn BrowserPage,
        relay: &Relay,
        ctx: &mut RunContext,
    ) -> Result<ChallengeOutcome> {
        let secs = self.window.as_secs();
        ctx.warn(format!("Two-factor approval required (GitHub Mobile), waiting {secs}s"));
        let shot = ctx.capture(page, "two_factor_mobile").await;

        relay
            .send(&format!(
                "⚠️ <b>Two-factor approval required (GitHub Mobile)</b>\n\nOpen the GitHub app on your phone and approve this sign-in.\nThe screenshot shows the number to match.\n\nWaiting: {secs}s"
            ))
            .await;
        if let Some(path) = &shot {
            relay
                .send_image(path, "two-factor page (number to match)")
                .await;
        }

        for tick in 1..=secs {
            sleep(TICK).await;

            let url = page.current_url().await?;
            if provider::is_plain_login(&url) {
                ctx.error("Sent back to the login page, sign-in has to start over");
                relay
                    .send("❌ <b>Two-factor approval rejected</b>\n\nGitHub returned to the login page.")
                    .await;
                return Ok(ChallengeOutcome::Rejected);
            }
            if !provider::in_two_factor_flow(&url) {
                ctx.success("Two-factor approval passed");
                relay.send("✅ <b>Two-factor approval passed</b>").await;
                return Ok(ChallengeOutcome::Resolved);
            }

            if tick % PROGRESS_EVERY == 0 {
                ctx.info(format!("  waiting... ({tick}/{secs}s)"));
                if let Some(path) = ctx.capture(page, &format!("two_factor_{tick}s")).await {
                    relay
                        .send_image(&path, &format!("two-factor page ({tick}s)"))
                        .await;
                }
            }

            if tick % RELOAD_EVERY == 0 && tick < secs {
                match page.reload(RELOAD_TIMEOUT).await {
                    Ok(()) => {
                        if let Err(error) = page.wait_for_dom(RELOAD_TIMEOUT).await {
                            debug!("DOM not ready after reload: {error:#}");
                        }
                    }
                    Err(error) => debug!("Soft reload failed: {error:#}"),
                }
            }
        }

        ctx.error("Two-factor approval timed out");
        relay.send("❌ <b>Two-factor approval timed out</b>").await;
        Ok(ChallengeOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockChannel, ScriptedPage, Sent};
    use std::sync::Arc;
    use tokio::time::Instant;

    const PUSH_URL: &str = "https://github.com/sessions/two-factor/mobile?auto=true";

    fn resolver() -> MobilePush {
        MobilePush {
            window: Duration::from_secs(120),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounce_to_login_is_rejected_early() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(PUSH_URL)
            .url_at(Duration::from_secs(15), "https://github.com/login");
        let relay = Relay::disabled();
        let mut ctx = RunContext::new("octocat", dir.path());

        let started = Instant::now();
        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Rejected);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn approval_resolves_and_progress_images_are_sent() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(PUSH_URL).url_at(
            Duration::from_secs(25),
            "https://github.com/login/oauth/authorize?client_id=x",
        );
        let channel = Arc::new(MockChannel::new());
        let relay = Relay::new(channel.clone(), "1");
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Resolved);
        let photos: Vec<String> = channel
            .sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Photo { caption, .. } => Some(caption),
                Sent::Text { .. } => None,
            })
            .collect();
        assert_eq!(
            photos,
            vec![
                "two-factor page (number to match)".to_string(),
                "two-factor page (10s)".to_string(),
                "two-factor page (20s)".to_string(),
            ]
        );
        assert_eq!(page.reloads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_after_window() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new(PUSH_URL);
        let relay = Relay::disabled();
        let mut ctx = RunContext::new("octocat", dir.path());

        let started = Instant::now();
        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        assert_eq!(page.reloads(), 3);
    }
}
