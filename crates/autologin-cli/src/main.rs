mod cli;
mod commands;
mod completions;
mod error;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = logging::init(cli.verbose, cli.log_dir.as_deref());

    let code = match cli.command {
        Some(Commands::Completions { shell }) => {
            completions::generate_completions(shell);
            0
        }
        Some(Commands::Probe { json }) => match commands::probe::run(json).await {
            Ok(code) => code,
            Err(err) => {
                error::print_error(&err);
                1
            }
        },
        Some(Commands::Run) | None => commands::run::run(&cli.login).await,
    };

    // `process::exit` skips destructors; flush the file writer first.
    drop(guard);
    std::process::exit(code);
}
