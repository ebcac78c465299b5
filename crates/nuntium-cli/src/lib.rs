//! Binaries of nuntium: the `nuntium` daemon and the `nuntium-inject`
//! harness, with their configuration and the bus socket client.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, InjectCli};
pub use client::SocketClient;
pub use config::DaemonConfig;
pub use error::{CliError, CliResult};
