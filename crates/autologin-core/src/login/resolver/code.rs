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

const PROBE: Duration = Duration::from_secs(2);
const BUTTON_PROBE: Duration = Duration::from_secs(1);

/// Authenticator/SMS code, typed in by the operator over the relay.
pub struct OneTimeCode {
    pub window: Duration,
}

impl OneTimeCode {
    /// Prefer the authenticator-code form when the page offers a switch.
    async fn switch_to_code_entry(
        &self,
        page: &dyn BrowserPage,
        ctx: &mut RunContext,
    ) -> Option<std::path::PathBuf> {
        let switch = match page.find_first_visible(provider::CODE_MODE_SWITCHES, PROBE).await {
            Ok(Some(selector)) => selector,
            Ok(None) => return None,
            Err(error) => {
                debug!("Probing for code entry switch failed: {error:#}");
                return None;
            }
        };

        if let Err(error) = page.click(&switch).await {
            debug!("Could not switch to code entry: {error:#}");
            return None;
        }
        sleep(Duration::from_secs(2)).await;
        if let Err(error) = page.wait_for_stable(Duration::from_secs(15)).await {
            debug!("Code entry page did not settle: {error:#}");
        }
        ctx.success("Switched to code entry");
        ctx.capture(page, "two_factor_code_entry").await
    }
}

#[async_trait]
impl ChallengeResolver for OneTimeCode {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::OneTimeCode
    }

    async fn resolve(
        &self,
        page: &dyn BrowserPage,
        relay: &Relay,
        ctx: &mut RunContext,
    ) -> Result<ChallengeOutcome> {
        let secs = self.window.as_secs();
        ctx.warn("Two-factor code required");
        let mut shot = ctx.capture(page, "two_factor_code").await;
        if let Some(switched) = self.switch_to_code_entry(page, ctx).await {
            shot = Some(switched);
        }

        relay
            .send(&format!(
                "🔐 <b>Two-factor code required</b>\n\nSend this in Telegram:\n<code>/code 123456</code>\n\nWaiting: {secs}s"
            ))
            .await;
        if let Some(path) = &shot {
            relay.send_image(path, "two-factor page").await;
        }

        ctx.info(format!("Waiting for /code from the operator ({secs}s)"));
        let cursor = relay.fast_forward().await;
        let Some(code) = relay.wait_for_code(cursor, self.window).await else {
            ctx.error("Timed out waiting for the two-factor code");
            relay.send("❌ <b>Timed out waiting for the code</b>").await;
            return Ok(ChallengeOutcome::TimedOut);
        };

        ctx.success("Code received, entering it");
        relay.send("✅ Code received, entering it...").await;

        let Some(field) = page.find_first_visible(provider::OTP_FIELDS, PROBE).await? else {
            ctx.error("No code input found on the page");
            relay.send("❌ <b>Code input not found</b>").await;
            return Ok(ChallengeOutcome::Rejected);
        };

        page.fill(&field, code.as_str()).await?;
        ctx.success("Code entered");
        sleep(Duration::from_secs(1)).await;

        match page.find_first_visible(provider::VERIFY_BUTTONS, BUTTON_PROBE).await? {
            Some(button) => {
                page.click(&button).await?;
                ctx.success("Clicked Verify");
            }
            None => {
                page.press_enter().await?;
                ctx.success("Submitted with Enter");
            }
        }

        sleep(Duration::from_secs(3)).await;
        if let Err(error) = page.wait_for_stable(Duration::from_secs(30)).await {
            debug!("Page did not settle after code submit: {error:#}");
        }
        ctx.capture(page, "after_code_submit").await;

        let url = page.current_url().await?;
        if provider::in_two_factor_flow(&url) {
            ctx.error("Still on the two-factor page, the code was probably wrong");
            relay
                .send("❌ <b>Code rejected</b>\n\nThe code was probably wrong; the run stops here.")
                .await;
            Ok(ChallengeOutcome::Rejected)
        } else {
            ctx.success("Two-factor code accepted");
            relay.send("✅ <b>Code accepted</b>").await;
            Ok(ChallengeOutcome::Resolved)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockChannel, ScriptedPage, Transition};
    use std::sync::Arc;

    const APP_URL: &str = "https://github.com/sessions/two-factor/app";
    const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize?client_id=x";
    const OPERATOR: &str = "777";

    fn resolver() -> OneTimeCode {
        OneTimeCode {
            window: Duration::from_secs(120),
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<MockChannel>, Relay) {
        let channel = Arc::new(MockChannel::new());
        let relay = Relay::new(channel.clone(), OPERATOR);
        (tempfile::tempdir().unwrap(), channel, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn relayed_code_is_entered_and_verified() {
        let (dir, channel, relay) = setup();
        channel.push_message_at(Duration::ZERO, OPERATOR, "/code 999999");
        channel.push_message_at(Duration::from_secs(20), "555", "/code 444444");
        channel.push_message_at(Duration::from_secs(40), OPERATOR, "/code 314159");
        let page = ScriptedPage::new(APP_URL)
            .visible(provider::OTP_FIELDS[0])
            .on_click(provider::VERIFY_BUTTONS[0], Transition::to(AUTHORIZE_URL));
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Resolved);
        assert_eq!(
            page.fills(),
            vec![(provider::OTP_FIELDS[0].to_string(), "314159".to_string())]
        );
        assert!(ctx.logs().iter().all(|entry| !entry.message.contains("314159")));
        assert!(channel.sent_texts().iter().any(|text| text.contains("Code accepted")));
    }

    #[tokio::test(start_paused = true)]
    async fn switches_to_code_entry_and_submits_with_enter() {
        let (dir, channel, relay) = setup();
        channel.push_message_at(Duration::from_secs(5), OPERATOR, "/code 24681357");
        let switch = provider::CODE_MODE_SWITCHES[0];
        let page = ScriptedPage::new("https://github.com/sessions/two-factor/webauthn")
            .on_click(
                switch,
                Transition::to(APP_URL).show("input#app_totp").hide(switch),
            )
            .on_enter(Transition::to(AUTHORIZE_URL));
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Resolved);
        assert_eq!(page.clicks(), vec![switch.to_string()]);
        assert_eq!(page.enters(), 1);
        assert_eq!(page.fills()[0].1, "24681357");
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_code_is_rejected_without_retry() {
        let (dir, channel, relay) = setup();
        channel.push_message_at(Duration::from_secs(5), OPERATOR, "/code 000000");
        channel.push_message_at(Duration::from_secs(30), OPERATOR, "/code 111111");
        let page = ScriptedPage::new(APP_URL)
            .visible(provider::OTP_FIELDS[2])
            .visible(provider::VERIFY_BUTTONS[1]);
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Rejected);
        assert_eq!(page.fills().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_code_field_is_rejected() {
        let (dir, channel, relay) = setup();
        channel.push_message_at(Duration::from_secs(5), OPERATOR, "/code 123456");
        let page = ScriptedPage::new(APP_URL);
        let mut ctx = RunContext::new("octocat", dir.path());

        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Rejected);
        assert!(channel.sent_texts().last().unwrap().contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_code_within_window_times_out() {
        let (dir, channel, relay) = setup();
        let page = ScriptedPage::new(APP_URL).visible(provider::OTP_FIELDS[0]);
        let mut ctx = RunContext::new("octocat", dir.path());

        let started = tokio::time::Instant::now();
        let outcome = resolver().resolve(&page, &relay, &mut ctx).await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(page.fills().is_empty());
        assert!(channel.sent_texts().last().unwrap().contains("Timed out"));
    }
}
