use thiserror::Error;

use crate::login::ChallengeKind;

/// Fatal outcomes of a login run.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("GitHub sign-in entry point not found on the target page")]
    ProviderEntryNotFound,

    #[error("Credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("{0} was rejected")]
    ChallengeRejected(ChallengeKind),

    #[error("{0} timed out")]
    ChallengeTimeout(ChallengeKind),

    #[error("Redirect back to the target did not complete after {attempts}s")]
    RedirectTimeout { attempts: u32 },

    #[error("Post-login verification failed at {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    UnhandledRuntimeError(#[from] anyhow::Error),
}

impl LoginError {
    /// Short line used in the operator report.
    pub fn summary(&self) -> String {
        match self {
            Self::ConfigurationMissing(what) => format!("credentials not configured ({what})"),
            Self::ProviderEntryNotFound => "GitHub button not found".to_string(),
            Self::CredentialsRejected(reason) if reason.is_empty() => {
                "GitHub login failed".to_string()
            }
            Self::CredentialsRejected(reason) => format!("GitHub login failed: {reason}"),
            Self::ChallengeRejected(kind) => format!("{kind} rejected"),
            Self::ChallengeTimeout(kind) => format!("{kind} timed out"),
            Self::RedirectTimeout { .. } => "redirect timed out".to_string(),
            Self::VerificationFailed(_) => "verification failed".to_string(),
            Self::UnhandledRuntimeError(error) => format!("{error:#}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "ConfigurationMissing",
            Self::ProviderEntryNotFound => "ProviderEntryNotFound",
            Self::CredentialsRejected(_) => "CredentialsRejected",
            Self::ChallengeRejected(_) => "ChallengeRejected",
            Self::ChallengeTimeout(_) => "ChallengeTimeout",
            Self::RedirectTimeout { .. } => "RedirectTimeout",
            Self::VerificationFailed(_) => "VerificationFailed",
            Self::UnhandledRuntimeError(_) => "UnhandledRuntimeError",
        }
    }
}

pub type Result<T> = std::result::Result<T, LoginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_errors_name_the_challenge() {
        let error = LoginError::ChallengeTimeout(ChallengeKind::MobilePush);
        assert_eq!(error.to_string(), "two-factor approval (GitHub Mobile) timed out");
        assert_eq!(error.kind(), "ChallengeTimeout");
    }

    #[test]
    fn runtime_errors_keep_context_chain() {
        let source = anyhow::anyhow!("bridge exited").context("navigate failed");
        let error: LoginError = source.into();
        assert_eq!(error.kind(), "UnhandledRuntimeError");
        assert_eq!(error.summary(), "navigate failed: bridge exited");
    }

    #[test]
    fn empty_rejection_reason_has_plain_summary() {
        assert_eq!(
            LoginError::CredentialsRejected(String::new()).summary(),
            "GitHub login failed"
        );
        assert_eq!(
            LoginError::CredentialsRejected("Incorrect password.".into()).summary(),
            "GitHub login failed: Incorrect password."
        );
    }
}
