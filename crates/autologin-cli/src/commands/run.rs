use autologin_browser::{LaunchOptions, PlaywrightPage};
use autologin_core::{CredentialStore, Relay, run_login};
use colored::Colorize;

use crate::cli::LoginArgs;
use crate::error::report_failure;

/// Run the login flow; returns the process exit code.
pub async fn run(args: &LoginArgs) -> i32 {
    let config = args.login_config();
    let relay = Relay::from_config(&args.relay_config());
    let store = CredentialStore::from_config(&args.secret_store_config());
    let launch = LaunchOptions::default().with_headless(args.headless);

    let outcome = run_login(&config, &relay, &store, || PlaywrightPage::launch(&launch)).await;

    match &outcome.result {
        Ok(()) => println!("{} Login succeeded", "✓".green().bold()),
        Err(error) => report_failure(error),
    }
    outcome.exit_code()
}
