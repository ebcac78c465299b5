//! Server and mediator configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// Idle timeout for request/response connections. Subscribed
    /// connections are exempt.
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connection_timeout: Duration::from_secs(30),
            max_connections: 64,
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// `$XDG_RUNTIME_DIR/nuntium.sock`, or `/tmp/nuntium-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("nuntium.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/nuntium-{}.sock", uid))
    }
}

/// Policy handed to every mediator at construction.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Announce notifications instead of downloading them.
    pub deferred_download: bool,
    /// Allow the sender to receive delivery reports for messages we
    /// retrieve, and request them for messages we send.
    pub use_delivery_reports: bool,
    /// Downloads attempted for a `NOTIFICATION` row across restarts.
    pub recovery_max_attempts: u32,
    pub recovery_delay: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            deferred_download: false,
            use_delivery_reports: false,
            recovery_max_attempts: 3,
            recovery_delay: Duration::from_secs(10),
        }
    }
}

impl MediatorConfig {
    pub fn with_deferred_download(mut self, deferred: bool) -> Self {
        self.deferred_download = deferred;
        self
    }

    pub fn with_delivery_reports(mut self, enabled: bool) -> Self {
        self.use_delivery_reports = enabled;
        self
    }

    pub fn with_recovery(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.recovery_max_attempts = max_attempts;
        self.recovery_delay = delay;
        self
    }
}
