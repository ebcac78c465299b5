//! Configuration commands.

use std::path::Path;

use crate::config::DaemonConfig;
use crate::error::{CliError, CliResult};

/// Prints the effective configuration, flags applied.
pub fn dump(config: &DaemonConfig, path: Option<&Path>) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    let path = path.map_or_else(DaemonConfig::default_path, Path::to_path_buf);
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

pub fn validate(config: &DaemonConfig) -> CliResult<()> {
    config.validate()?;
    for modem in &config.modems {
        if !modem.contexts.iter().any(|c| c.has_message_center()) {
            println!("warning: modem {} has no context with a message center", modem.id);
        }
    }
    println!("Configuration is valid.");
    Ok(())
}

pub fn path() -> CliResult<()> {
    println!("config: {}", DaemonConfig::default_path().display());
    Ok(())
}
