use autologin_browser::{BrowserPage, Cookie};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use super::challenge::ChallengeOutcome;
use super::context::RunContext;
use super::provider::{self, AuthPage};
use super::resolver::{ChallengeResolver, DeviceApproval, MobilePush, OneTimeCode};
use super::stage::{Stage, Transition};
use crate::channel::Relay;
use crate::config::{Credentials, LoginConfig, TargetSite};
use crate::credential::{CredentialStore, PersistOutcome};
use crate::error::{LoginError, Result};

const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(60);
const STABLE_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE: Duration = Duration::from_secs(3);
const KEEPALIVE_PAGES: &[(&str, &str)] = &[("/", "console"), ("/apps", "apps")];

/// Drives one login attempt through the [`Stage`] table.
pub struct LoginOrchestrator<'a> {
    page: &'a dyn BrowserPage,
    relay: &'a Relay,
    store: &'a CredentialStore,
    config: &'a LoginConfig,
    credentials: &'a Credentials,
    trace: Vec<Stage>,
    persisted: Option<PersistOutcome>,
}

impl<'a> LoginOrchestrator<'a> {
    pub fn new(
        page: &'a dyn BrowserPage,
        relay: &'a Relay,
        store: &'a CredentialStore,
        config: &'a LoginConfig,
        credentials: &'a Credentials,
    ) -> Self {
        Self {
            page,
            relay,
            store,
            config,
            credentials,
            trace: Vec::new(),
            persisted: None,
        }
    }

    /// Stages visited so far, in order.
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    pub fn persisted(&self) -> Option<PersistOutcome> {
        self.persisted
    }

    /// Run from [`Stage::Preload`] until [`Stage::Report`] or the first
    /// fatal error.
    pub async fn drive(&mut self, ctx: &mut RunContext) -> Result<()> {
        let mut stage = Stage::Preload;
        loop {
            self.trace.push(stage);
            if stage.is_terminal() {
                return Ok(());
            }
            debug!(%stage, "Entering stage");
            stage = self.step(stage, ctx).await?.resolve(stage);
        }
    }

    async fn step(&mut self, stage: Stage, ctx: &mut RunContext) -> Result<Transition> {
        match stage {
            Stage::Preload => self.preload(ctx).await,
            Stage::InitialNavigate => self.initial_navigate(ctx).await,
            Stage::ProviderHandoff => self.provider_handoff(ctx).await,
            Stage::ProviderAuth => self.provider_auth(ctx).await,
            Stage::AuthorizationGrant => {
                self.authorize_if_prompted(ctx).await?;
                Ok(Transition::Advance)
            }
            Stage::RedirectWait => self.redirect_wait(ctx).await,
            Stage::PostAuthVerify => self.post_auth_verify(ctx).await,
            Stage::KeepAliveVisit => self.keep_alive(ctx).await,
            Stage::CredentialExtraction => self.extract_credential(ctx).await,
            Stage::Report => Ok(Transition::Advance),
        }
    }

    async fn preload(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        let Some(session) = self.config.session_cookie() else {
            return Ok(Transition::Advance);
        };

        let cookies = [
            Cookie::new(provider::SESSION_COOKIE, session, provider::PROVIDER_DOMAIN),
            Cookie::new(provider::LOGGED_IN_COOKIE, "yes", provider::PROVIDER_DOMAIN),
        ];
        match self.page.add_cookies(&cookies).await {
            Ok(()) => ctx.success("Loaded saved GitHub session cookie"),
            Err(error) => ctx.warn(format!("Failed to load session cookie: {error:#}")),
        }
        Ok(Transition::Advance)
    }

    async fn initial_navigate(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        ctx.step("Opening the sign-in page");
        self.page
            .navigate(&self.config.target.signin_url(), NAVIGATE_TIMEOUT)
            .await?;
        self.wait_stable().await;
        sleep(Duration::from_secs(2)).await;
        ctx.capture(self.page, "target").await;

        let url = self.page.current_url().await?;
        if !TargetSite::is_signin_url(&url) {
            ctx.success("Already signed in");
            return Ok(Transition::Jump(Stage::PostAuthVerify));
        }
        Ok(Transition::Advance)
    }

    async fn provider_handoff(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        ctx.step("Choosing GitHub sign-in");
        let Some(entry) = self
            .page
            .find_first_visible(provider::PROVIDER_ENTRY, PROBE)
            .await?
        else {
            ctx.error("GitHub button not found");
            return Err(LoginError::ProviderEntryNotFound);
        };

        self.page.click(&entry).await?;
        ctx.success("Clicked GitHub");
        self.settle(Duration::from_secs(3)).await;
        ctx.capture(self.page, "after_github_click").await;

        let url = self.page.current_url().await?;
        ctx.info(format!("Current page: {url}"));
        Ok(Transition::Advance)
    }

    async fn provider_auth(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        let url = self.page.current_url().await?;
        match provider::classify(&url) {
            AuthPage::Authorize => ctx.success("GitHub session still valid"),
            AuthPage::Credentials => self.password_login(ctx).await?,
            AuthPage::Other => debug!("No GitHub form at {}, leaving it to the redirect", url),
        }
        Ok(Transition::Advance)
    }

    async fn password_login(&mut self, ctx: &mut RunContext) -> Result<()> {
        ctx.step("Signing in to GitHub");
        ctx.capture(self.page, "github_login").await;

        let filled = async {
            self.page
                .fill(provider::LOGIN_FIELD, &self.credentials.username)
                .await?;
            self.page
                .fill(provider::PASSWORD_FIELD, &self.credentials.password)
                .await
        };
        if let Err(error) = filled.await {
            ctx.error("Could not enter credentials");
            return Err(LoginError::CredentialsRejected(format!(
                "login form unavailable: {error:#}"
            )));
        }
        ctx.info("Credentials entered");
        ctx.capture(self.page, "github_filled").await;

        if let Err(error) = self.page.click(provider::SUBMIT_BUTTON).await {
            debug!("Submit click failed: {error:#}");
        }
        self.settle(Duration::from_secs(3)).await;
        ctx.capture(self.page, "github_after_submit").await;

        let url = self.page.current_url().await?;
        ctx.info(format!("Current page: {url}"));

        if provider::is_device_verification(&url) {
            let resolver = DeviceApproval {
                window: self.config.waits.device_verify,
            };
            self.face(&resolver, ctx).await?;
            self.after_challenge().await;
            ctx.capture(self.page, "after_device_verification").await;
        }

        let url = self.page.current_url().await?;
        if provider::is_two_factor(&url) {
            let window = self.config.waits.two_factor;
            if provider::is_mobile_push(&url) {
                self.face(&MobilePush { window }, ctx).await?;
            } else {
                self.face(&OneTimeCode { window }, ctx).await?;
            }
            self.after_challenge().await;
        }

        if matches!(
            self.page
                .find_first_visible(&[provider::ERROR_BANNER], Duration::from_secs(2))
                .await,
            Ok(Some(_))
        ) {
            let message = self
                .page
                .text_of(provider::ERROR_BANNER)
                .await
                .unwrap_or_default();
            let message = message.trim().to_string();
            ctx.error(format!("GitHub rejected the sign-in: {message}"));
            return Err(LoginError::CredentialsRejected(message));
        }

        Ok(())
    }

    async fn face(&self, resolver: &dyn ChallengeResolver, ctx: &mut RunContext) -> Result<()> {
        let kind = resolver.kind();
        ctx.record_challenge(kind);
        info!(challenge = %kind, "Challenge encountered");

        match resolver.resolve(self.page, self.relay, ctx).await? {
            ChallengeOutcome::Resolved => Ok(()),
            ChallengeOutcome::TimedOut => Err(LoginError::ChallengeTimeout(kind)),
            ChallengeOutcome::Rejected => Err(LoginError::ChallengeRejected(kind)),
        }
    }

    /// Click through the OAuth consent page when it is showing.
    async fn authorize_if_prompted(&self, ctx: &mut RunContext) -> Result<bool> {
        let url = self.page.current_url().await?;
        if !provider::is_authorize(&url) {
            return Ok(false);
        }

        ctx.step("Handling OAuth authorization");
        ctx.capture(self.page, "oauth").await;
        if let Some(button) = self
            .page
            .find_first_visible(provider::AUTHORIZE_BUTTONS, PROBE)
            .await?
        {
            self.page.click(&button).await?;
            ctx.success("Clicked Authorize");
        }
        self.settle(Duration::from_secs(3)).await;
        Ok(true)
    }

    async fn redirect_wait(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        ctx.step("Waiting for the redirect back");
        let attempts = self.config.waits.redirect_attempts;

        for attempt in 0..attempts {
            let url = self.page.current_url().await?;
            if self.config.target.is_authenticated_url(&url) {
                ctx.success("Redirect complete");
                ctx.capture(self.page, "redirect_ok").await;
                return Ok(Transition::Advance);
            }
            if provider::is_authorize(&url) {
                self.authorize_if_prompted(ctx).await?;
            }
            sleep(Duration::from_secs(1)).await;
            if attempt % 10 == 0 {
                ctx.info(format!("  waiting... ({attempt}s)"));
            }
        }

        ctx.error("Redirect timed out");
        Err(LoginError::RedirectTimeout { attempts })
    }

    async fn post_auth_verify(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        let url = self.page.current_url().await?;
        ctx.info(format!("Final page: {url}"));
        if !self.config.target.is_authenticated_url(&url) {
            ctx.error("Not on the console after login");
            return Err(LoginError::VerificationFailed(url));
        }
        ctx.success("Login verified");
        Ok(Transition::Advance)
    }

    async fn keep_alive(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        ctx.step("Keep-alive visits");
        for (path, label) in KEEPALIVE_PAGES {
            let url = self.config.target.page_url(path);
            match self.page.navigate(&url, STABLE_TIMEOUT).await {
                Ok(()) => {
                    if let Err(error) = self.page.wait_for_stable(Duration::from_secs(15)).await {
                        debug!("{} did not settle: {:#}", label, error);
                    }
                    ctx.success(format!("Visited {label}"));
                }
                Err(error) => ctx.warn(format!("Visit to {label} failed: {error:#}")),
            }
            sleep(Duration::from_secs(2)).await;
        }
        ctx.capture(self.page, "done").await;
        Ok(Transition::Advance)
    }

    async fn extract_credential(&mut self, ctx: &mut RunContext) -> Result<Transition> {
        ctx.step("Refreshing the session cookie");
        let cookies = match self.page.cookies_of("github").await {
            Ok(cookies) => cookies,
            Err(error) => {
                ctx.warn(format!("Could not read cookies: {error:#}"));
                Vec::new()
            }
        };

        match cookies
            .into_iter()
            .find(|cookie| cookie.name == provider::SESSION_COOKIE)
        {
            Some(cookie) => {
                let outcome = self.store.persist(&cookie.value, self.relay, ctx).await;
                self.persisted = Some(outcome);
            }
            None => ctx.warn("No new session cookie found"),
        }
        Ok(Transition::Advance)
    }

    async fn settle(&self, pause: Duration) {
        sleep(pause).await;
        self.wait_stable().await;
    }

    async fn after_challenge(&self) {
        self.wait_stable().await;
        sleep(Duration::from_secs(2)).await;
    }

    async fn wait_stable(&self) {
        if let Err(error) = self.page.wait_for_stable(STABLE_TIMEOUT).await {
            debug!("Page did not reach network idle: {error:#}");
        }
    }
}
