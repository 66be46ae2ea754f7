use std::fmt;

/// Steps of a login run, in their default order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preload,
    InitialNavigate,
    ProviderHandoff,
    ProviderAuth,
    AuthorizationGrant,
    RedirectWait,
    PostAuthVerify,
    KeepAliveVisit,
    CredentialExtraction,
    Report,
}

impl Stage {
    /// Default successor; `None` for the terminal stage.
    pub fn successor(self) -> Option<Stage> {
        match self {
            Self::Preload => Some(Self::InitialNavigate),
            Self::InitialNavigate => Some(Self::ProviderHandoff),
            Self::ProviderHandoff => Some(Self::ProviderAuth),
            Self::ProviderAuth => Some(Self::AuthorizationGrant),
            Self::AuthorizationGrant => Some(Self::RedirectWait),
            Self::RedirectWait => Some(Self::PostAuthVerify),
            Self::PostAuthVerify => Some(Self::KeepAliveVisit),
            Self::KeepAliveVisit => Some(Self::CredentialExtraction),
            Self::CredentialExtraction => Some(Self::Report),
            Self::Report => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Preload => "preload",
            Self::InitialNavigate => "initial navigation",
            Self::ProviderHandoff => "provider handoff",
            Self::ProviderAuth => "provider authentication",
            Self::AuthorizationGrant => "authorization grant",
            Self::RedirectWait => "redirect wait",
            Self::PostAuthVerify => "post-auth verification",
            Self::KeepAliveVisit => "keep-alive visit",
            Self::CredentialExtraction => "credential extraction",
            Self::Report => "report",
        };
        f.write_str(label)
    }
}

/// What a stage handler asks for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Advance,
    Jump(Stage),
}

impl Transition {
    pub(crate) fn resolve(self, from: Stage) -> Stage {
        match self {
            Self::Advance => from.successor().unwrap_or(Stage::Report),
            Self::Jump(stage) => stage,
        }
    }
}
