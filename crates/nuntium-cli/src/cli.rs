//! Command-line definitions for both binaries.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use nuntium_core::TracingOutputFormat;

/// nuntium - MMS daemon
#[derive(Debug, Parser)]
#[command(name = "nuntium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "NUNTIUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long)]
    pub log_format: Option<TracingOutputFormat>,

    /// Path to the bus socket
    #[arg(long, env = "NUNTIUM_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Directory holding message state and content
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding transient PDUs and the preferred context file
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Announce notifications instead of downloading them
    #[arg(long)]
    pub deferred_download: bool,

    /// Allow and request delivery reports
    #[arg(long)]
    pub use_delivery_reports: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground (the default)
    Daemon,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

/// nuntium-inject - deliver a fake MMS notification to a running daemon
///
/// Serves an M-Retrieve.Conf over HTTP on localhost and pushes an
/// M-Notification.Ind pointing at it to the daemon's push agent.
#[derive(Debug, Parser)]
#[command(name = "nuntium-inject")]
#[command(author, version, about, long_about = None)]
pub struct InjectCli {
    /// Push agent object path to deliver to, e.g. /nuntium/agent/ril_0
    #[arg(long)]
    pub end_point: String,

    /// Originator of the built-in sample message
    #[arg(long, default_value = "+15550100")]
    pub sender: String,

    /// Originator announced in the notification and the push metadata
    #[arg(long)]
    pub sender_notification: Option<String>,

    /// M-Retrieve.Conf file to serve instead of the built-in sample
    #[arg(long)]
    pub m_retrieve_conf: Option<PathBuf>,

    /// Number of content requests answered with 503 before serving
    #[arg(long, default_value = "0")]
    pub denial_count: u32,

    /// Path to the bus socket
    #[arg(long, env = "NUNTIUM_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Seconds to wait for the daemon to fetch the content
    #[arg(long, default_value = "120")]
    pub wait: u64,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,
}

impl InjectCli {
    pub fn notification_sender(&self) -> &str {
        self.sender_notification.as_deref().unwrap_or(&self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_flags() {
        let cli = Cli::try_parse_from([
            "nuntium",
            "--debug",
            "--log-format",
            "json",
            "--deferred-download",
            "--data-dir",
            "/var/lib/nuntium",
        ])
        .unwrap();
        assert!(cli.debug);
        assert!(cli.deferred_download);
        assert!(!cli.use_delivery_reports);
        assert_eq!(cli.log_format, Some(TracingOutputFormat::Json));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/var/lib/nuntium")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::try_parse_from(["nuntium", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Validate
            })
        ));
    }

    #[test]
    fn inject_requires_end_point() {
        assert!(InjectCli::try_parse_from(["nuntium-inject"]).is_err());

        let cli = InjectCli::try_parse_from([
            "nuntium-inject",
            "--end-point",
            "/nuntium/agent/ril_0",
            "--denial-count",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.end_point, "/nuntium/agent/ril_0");
        assert_eq!(cli.denial_count, 2);
        assert_eq!(cli.notification_sender(), "+15550100");
        assert!(cli.m_retrieve_conf.is_none());
    }

    #[test]
    fn inject_notification_sender_override() {
        let cli = InjectCli::try_parse_from([
            "nuntium-inject",
            "--end-point",
            "/nuntium/agent/ril_0",
            "--sender-notification",
            "+15550142",
        ])
        .unwrap();
        assert_eq!(cli.notification_sender(), "+15550142");
    }
}
