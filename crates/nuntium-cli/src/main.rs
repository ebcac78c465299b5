//! nuntium daemon entry point.

use std::process::ExitCode;

use clap::Parser;

use nuntium_cli::cli::{Cli, Command, ConfigAction};
use nuntium_cli::commands;
use nuntium_cli::config::DaemonConfig;
use nuntium_cli::error::CliResult;
use nuntium_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = TracingConfig::daemon().with_debug(cli.debug);
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Err(e) = init_tracing(logging) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "nuntium failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = DaemonConfig::load(cli.config.as_deref())?.with_overrides(&cli);

    match cli.command {
        None | Some(Command::Daemon) => commands::daemon::run(&config).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
