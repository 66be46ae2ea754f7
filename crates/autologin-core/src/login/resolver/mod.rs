//! Bounded polling loops that wait out a human-paced challenge.
//!
//! Each resolver owns one [`ChallengeKind`]. They only ever read the URL,
//! reload softly and talk to the operator; a timed-out or rejected challenge
//! is reported as an outcome, while page plumbing failures surface as errors.

mod code;
mod device;
mod push;

use anyhow::Result;
use async_trait::async_trait;
use autologin_browser::BrowserPage;

pub use code::OneTimeCode;
pub use device::DeviceApproval;
pub use push::MobilePush;

use super::challenge::{ChallengeKind, ChallengeOutcome};
use super::context::RunContext;
use crate::channel::Relay;

#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    fn kind(&self) -> ChallengeKind;

    async fn resolve(
        &self,
        page: &dyn BrowserPage,
        relay: &Relay,
        ctx: &mut RunContext,
    ) -> Result<ChallengeOutcome>;
}
