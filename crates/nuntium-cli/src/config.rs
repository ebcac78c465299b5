//! Daemon configuration.
//!
//! Everything lives in `~/.config/nuntium/config.toml`. Modems are listed
//! with the bearer contexts their radio daemon reports:
//!
//! ```toml
//! deferred_download = false
//!
//! [recovery]
//! max_attempts = 3
//! delay_secs = 10
//!
//! [[modems]]
//! id = "/ril_0"
//! identity = "310150123456789"
//!
//! [[modems.contexts]]
//! id = "/ril_0/context2"
//! kind = "mms"
//! message_center = "http://mmsc.example.net"
//! proxy = "10.0.0.1:8080"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nuntium_bearer::{BearerContext, HttpConfig};
use nuntium_server::MediatorConfig;

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub deferred_download: bool,
    pub use_delivery_reports: bool,
    pub http: HttpSettings,
    pub recovery: RecoverySettings,
    pub modems: Vec<ModemSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: Option<String>,
    /// User-agent profile URL sent as `x-wap-profile`.
    pub uaprof: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            uaprof: None,
            timeout_secs: 60,
        }
    }
}

/// Retries of interrupted downloads found at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemSettings {
    /// Radio-daemon object path, e.g. `/ril_0`.
    pub id: String,
    /// SIM identity (IMSI). Without one the modem has no service.
    #[serde(default)]
    pub identity: Option<String>,
    /// Whether the radio daemon delivers WAP pushes for this modem.
    #[serde(default = "default_push_agent")]
    pub push_agent: bool,
    #[serde(default)]
    pub contexts: Vec<BearerContext>,
}

fn default_push_agent() -> bool {
    true
}

impl DaemonConfig {
    /// Loads `path`, or the default file when none is given. Only a
    /// missing default file falls back to defaults.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CliResult<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(format!("failed to parse config: {}", e)))
    }

    /// Command-line flags win over the file.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = Some(dir.clone());
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = Some(dir.clone());
        }
        if let Some(path) = &cli.socket_path {
            self.socket_path = Some(path.clone());
        }
        self.deferred_download |= cli.deferred_download;
        self.use_delivery_reports |= cli.use_delivery_reports;
        self
    }

    pub fn validate(&self) -> CliResult<()> {
        let mut seen = HashSet::new();
        for modem in &self.modems {
            if modem.id.is_empty() {
                return Err(CliError::Config("modem id must not be empty".into()));
            }
            if !seen.insert(modem.id.as_str()) {
                return Err(CliError::Config(format!("modem {} listed twice", modem.id)));
            }
            if modem.identity.as_deref() == Some("") {
                return Err(CliError::Config(format!(
                    "modem {} has an empty identity",
                    modem.id
                )));
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(CliError::Config("http.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nuntium")
            .join("config.toml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("nuntium")
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("nuntium")
        })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(nuntium_server::default_socket_path)
    }

    pub fn mediator_config(&self) -> MediatorConfig {
        MediatorConfig::default()
            .with_deferred_download(self.deferred_download)
            .with_delivery_reports(self.use_delivery_reports)
            .with_recovery(
                self.recovery.max_attempts,
                Duration::from_secs(self.recovery.delay_secs),
            )
    }

    pub fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig {
            uaprof: self.http.uaprof.clone(),
            timeout: Duration::from_secs(self.http.timeout_secs),
            ..HttpConfig::default()
        };
        if let Some(user_agent) = &self.http.user_agent {
            config.user_agent = user_agent.clone();
        }
        config
    }
}
