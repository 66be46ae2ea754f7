use std::fmt;

/// Challenges GitHub may put between the password form and the OAuth grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    DeviceApproval,
    MobilePush,
    OneTimeCode,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DeviceApproval => "device verification",
            Self::MobilePush => "two-factor approval (GitHub Mobile)",
            Self::OneTimeCode => "two-factor code",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Resolved,
    TimedOut,
    Rejected,
}
