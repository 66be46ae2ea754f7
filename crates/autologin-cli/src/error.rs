use autologin_core::LoginError;
use colored::Colorize;

pub fn report_failure(err: &LoginError) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    match err {
        LoginError::ConfigurationMissing(_) => {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Provide GitHub credentials with:");
            eprintln!(
                "  {} GH_USERNAME=<user> GH_PASSWORD=<password> autologin",
                "$".dimmed()
            );
        }
        LoginError::UnhandledRuntimeError(inner)
            if inner.to_string().contains("launch browser") =>
        {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Check the browser runtime with:");
            eprintln!("  {} autologin probe", "$".dimmed());
        }
        LoginError::ChallengeTimeout(_) => {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Raise TWO_FACTOR_WAIT / DEVICE_VERIFY_WAIT if approvals need more time.");
        }
        _ => {}
    }
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);
}
