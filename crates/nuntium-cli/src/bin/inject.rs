//! nuntium-inject entry point. Exits 0 once the daemon fetched the
//! content, 1 otherwise.

use std::process::ExitCode;

use clap::Parser;

use nuntium_cli::InjectCli;
use nuntium_cli::commands::inject;
use nuntium_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = InjectCli::parse();

    if let Err(e) = init_tracing(TracingConfig::cli().with_debug(cli.debug)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match inject::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
