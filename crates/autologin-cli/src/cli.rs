use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

use autologin_core::config::{DEFAULT_TARGET_DOMAIN, DEFAULT_TARGET_URL};
use autologin_core::{LoginConfig, RelayConfig, SecretStoreConfig, TargetSite, WaitSettings};

#[derive(Parser)]
#[command(name = "autologin")]
#[command(
    version,
    about = "Autologin - unattended GitHub OAuth sign-in with Telegram-relayed challenges"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Write a daily rolling log file into this directory
    #[arg(long, global = true, env = "AUTOLOGIN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub login: LoginArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the login flow (default)
    Run,

    /// Check that Node.js, Playwright and Chromium are available
    Probe {
        /// Print the probe result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// GitHub username
    #[arg(long, env = "GH_USERNAME")]
    pub username: Option<String>,

    /// GitHub password
    #[arg(long, env = "GH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Saved GitHub `user_session` cookie
    #[arg(long, env = "GH_SESSION", hide_env_values = true)]
    pub session: Option<String>,

    /// Seconds to wait for a two-factor approval or code
    #[arg(long, env = "TWO_FACTOR_WAIT", default_value_t = 120)]
    pub two_factor_wait: u64,

    /// Seconds to wait for device verification
    #[arg(long, env = "DEVICE_VERIFY_WAIT", default_value_t = 30)]
    pub device_verify_wait: u64,

    /// One-second attempts spent waiting for the OAuth redirect
    #[arg(long, env = "REDIRECT_WAIT", default_value_t = 60)]
    pub redirect_wait: u32,

    /// Telegram bot token
    #[arg(long, env = "TG_BOT_TOKEN", hide_env_values = true)]
    pub tg_bot_token: Option<String>,

    /// Telegram chat id of the operator
    #[arg(long, env = "TG_CHAT_ID")]
    pub tg_chat_id: Option<String>,

    /// Token allowed to write the repository's Actions secrets
    #[arg(long, env = "REPO_TOKEN", hide_env_values = true)]
    pub repo_token: Option<String>,

    /// Repository (`owner/name`) holding the GH_SESSION secret
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Console base URL
    #[arg(long, env = "CLAW_CLOUD_URL", default_value = DEFAULT_TARGET_URL)]
    pub target_url: String,

    /// Domain that marks a signed-in console page
    #[arg(long, env = "TARGET_DOMAIN", default_value = DEFAULT_TARGET_DOMAIN)]
    pub target_domain: String,

    /// Directory for screenshots
    #[arg(long, env = "CAPTURE_DIR", default_value = ".")]
    pub capture_dir: PathBuf,

    /// Run the browser headless
    #[arg(long, env = "HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,
}

impl LoginArgs {
    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            session_cookie: self.session.clone(),
            target: TargetSite::new(self.target_url.clone(), self.target_domain.clone()),
            waits: WaitSettings {
                device_verify: Duration::from_secs(self.device_verify_wait),
                two_factor: Duration::from_secs(self.two_factor_wait),
                redirect_attempts: self.redirect_wait,
            },
            capture_dir: self.capture_dir.clone(),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            bot_token: self.tg_bot_token.clone(),
            chat_id: self.tg_chat_id.clone(),
            ..RelayConfig::default()
        }
    }

    pub fn secret_store_config(&self) -> SecretStoreConfig {
        SecretStoreConfig {
            token: self.repo_token.clone(),
            repository: self.repository.clone(),
            ..SecretStoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_login_config() {
        let cli = Cli::try_parse_from([
            "autologin",
            "--username",
            "octocat",
            "--password",
            "hunter2",
            "--two-factor-wait",
            "90",
            "--target-url",
            "https://eu-central-1.run.claw.cloud/",
            "--headless",
            "false",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert!(!cli.login.headless);
        let config = cli.login.login_config();
        assert_eq!(config.username.as_deref(), Some("octocat"));
        assert_eq!(config.waits.two_factor, Duration::from_secs(90));
        assert_eq!(config.waits.device_verify, Duration::from_secs(30));
        assert_eq!(
            config.target.signin_url(),
            "https://eu-central-1.run.claw.cloud/signin"
        );
    }

    #[test]
    fn probe_subcommand_parses_with_verbosity() {
        let cli = Cli::try_parse_from(["autologin", "-vv", "probe", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Commands::Probe { json: true })));
    }

    #[test]
    fn relay_and_store_configs_follow_flags() {
        let cli = Cli::try_parse_from([
            "autologin",
            "--tg-bot-token",
            "123:abc",
            "--tg-chat-id",
            "42",
            "--repository",
            "octo/repo",
        ])
        .unwrap();

        assert_eq!(cli.login.relay_config().resolved(), Some(("123:abc", "42")));
        assert!(cli.login.secret_store_config().resolved().is_none());
    }
}
