//! The login run: stage machine, challenge resolvers and final report.

mod challenge;
mod context;
mod orchestrator;
pub mod provider;
mod report;
pub mod resolver;
mod stage;

use anyhow::Context;
use autologin_browser::BrowserPage;
use std::future::Future;
use tracing::{error, info, warn};

pub use challenge::{ChallengeKind, ChallengeOutcome};
pub use context::{LogEntry, LogLevel, RunContext};
pub use orchestrator::LoginOrchestrator;
pub use report::{compose as compose_report, send_report};
pub use stage::Stage;

use crate::channel::Relay;
use crate::config::LoginConfig;
use crate::credential::{CredentialStore, PersistOutcome};
use crate::error::LoginError;

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<(), LoginError>,
    pub trace: Vec<Stage>,
    pub persisted: Option<PersistOutcome>,
    pub context: RunContext,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Run one login end to end and report it.
///
/// `launch` is only invoked once the configuration is known to be complete.
/// The page it yields is closed on every path, and exactly one report is sent.
pub async fn run_login<L, Fut, P>(
    config: &LoginConfig,
    relay: &Relay,
    store: &CredentialStore,
    launch: L,
) -> RunOutcome
where
    L: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<P>>,
    P: BrowserPage,
{
    let username = config.username.clone().unwrap_or_default();
    let mut ctx = RunContext::new(username, config.capture_dir.clone());

    info!("Starting login for {}", config.target.base_url);
    if config.session_cookie().is_some() {
        ctx.info("Saved session cookie found");
    } else {
        ctx.info("No saved session cookie");
    }
    ctx.info(format!(
        "Two-factor wait: {}s",
        config.waits.two_factor.as_secs()
    ));

    let credentials = match config.credentials() {
        Ok(credentials) => credentials,
        Err(error) => {
            ctx.error(error.to_string());
            return finish(relay, ctx, Err(error), Vec::new(), None).await;
        }
    };

    if let Err(error) = tokio::fs::create_dir_all(&config.capture_dir).await {
        warn!(
            "Capture directory {} unavailable: {}",
            config.capture_dir.display(),
            error
        );
    }

    ctx.step("Launching browser");
    let page = match launch().await.context("Failed to launch browser") {
        Ok(page) => page,
        Err(error) => {
            let error = LoginError::from(error);
            ctx.error(error.summary());
            return finish(relay, ctx, Err(error), Vec::new(), None).await;
        }
    };

    let mut orchestrator = LoginOrchestrator::new(&page, relay, store, config, &credentials);
    let result = orchestrator.drive(&mut ctx).await;
    let trace = orchestrator.trace().to_vec();
    let persisted = orchestrator.persisted();

    if let Err(error) = &result {
        error!(kind = error.kind(), "Login failed: {}", error);
        ctx.error(format!("Exception: {}", error.summary()));
        ctx.capture(&page, "exception").await;
    }

    if let Err(error) = page.close().await {
        warn!("Failed to close browser: {error:#}");
    }

    finish(relay, ctx, result, trace, persisted).await
}

async fn finish(
    relay: &Relay,
    ctx: RunContext,
    result: Result<(), LoginError>,
    trace: Vec<Stage>,
    persisted: Option<PersistOutcome>,
) -> RunOutcome {
    send_report(relay, &ctx, result.as_ref().err()).await;
    match &result {
        Ok(()) => info!("Login finished successfully"),
        Err(error) => error!("Login finished with {}", error.kind()),
    }

    RunOutcome {
        result,
        trace,
        persisted,
        context: ctx,
    }
}
