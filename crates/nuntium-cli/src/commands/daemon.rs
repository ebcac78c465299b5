//! Daemon command: runs every configured modem's mediator and serves the
//! bus until SIGTERM/SIGINT.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use nuntium_bearer::{HttpTransport, SharedModem, StaticModem, Transport};
use nuntium_server::{
    Bus, Mediator, MediatorHandle, MediatorServices, MmsStore, PreferredContexts, ServerConfig,
    SignalHandler, SocketServer, make_connection_handler,
};

use crate::config::DaemonConfig;
use crate::error::CliResult;

/// How long a mediator gets to finish its transfer in flight.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run(config: &DaemonConfig) -> CliResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();
    serve(config, signal_handler.shutdown().wait()).await
}

/// Starts everything, serves until `shutdown` completes, then stops the
/// mediators. Failures before serving are fatal.
pub async fn serve(config: &DaemonConfig, shutdown: impl Future<Output = ()> + Send) -> CliResult<()> {
    config.validate()?;

    let data_dir = config.data_dir();
    let cache_dir = config.cache_dir();
    let store = Arc::new(MmsStore::open(&data_dir, &cache_dir)?);
    let preferred = Arc::new(PreferredContexts::new(&cache_dir));
    let bus = Arc::new(Bus::new());
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.http_config()));
    info!(
        data_dir = %data_dir.display(),
        cache_dir = %cache_dir.display(),
        "Message store ready"
    );

    let socket_path = config.socket_path();
    let server = SocketServer::new(ServerConfig::new(&socket_path)).await?;

    let services = MediatorServices {
        transport,
        store,
        preferred: preferred.clone(),
        messaging: bus.clone(),
    };
    let mut mediators = Vec::with_capacity(config.modems.len());
    for modem in &config.modems {
        let shared: SharedModem = Arc::new(StaticModem::new(&modem.id, modem.contexts.clone()));
        let (handle, task) = Mediator::spawn(shared, services.clone(), config.mediator_config());
        if modem.push_agent {
            handle.push_agent(true).await?;
        }
        match &modem.identity {
            Some(identity) => handle.identity_added(identity.clone()).await?,
            None => warn!(modem = %modem.id, "No SIM identity configured, modem stays idle"),
        }
        mediators.push((handle, task));
    }
    info!(modems = mediators.len(), "Mediators started");

    let handler = make_connection_handler(bus, preferred);
    server.run_until_shutdown(handler, shutdown).await?;

    info!("Shutting down...");
    stop_mediators(mediators).await;
    info!("Daemon stopped");
    Ok(())
}

async fn stop_mediators(mediators: Vec<(MediatorHandle, JoinHandle<()>)>) {
    for (handle, _) in &mediators {
        if let Err(e) = handle.terminate().await {
            warn!(modem = %handle.modem_id(), error = %e, "Failed to stop mediator");
        }
    }
    for (handle, task) in mediators {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!(modem = %handle.modem_id(), "Mediator did not stop in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuntium_protocol::{Request, Response};
    use tokio::sync::oneshot;

    use crate::client::SocketClient;

    const CONFIG: &str = r#"
[[modems]]
id = "/ril_0"
identity = "310150123456789"

[[modems.contexts]]
id = "/ril_0/context2"
kind = "mms"
message_center = "http://mmsc.example.net"
"#;

    #[tokio::test]
    async fn serves_configured_modems_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::parse(CONFIG).unwrap();
        config.data_dir = Some(dir.path().join("data"));
        config.cache_dir = Some(dir.path().join("cache"));
        config.socket_path = Some(dir.path().join("bus.sock"));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let daemon_config = config.clone();
        let daemon = tokio::spawn(async move {
            serve(&daemon_config, async {
                let _ = stop_rx.await;
            })
            .await
        });

        let client = SocketClient::new(config.socket_path(), Duration::from_secs(5));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let services = loop {
            if let Ok(Response::Services { services }) = client.send(Request::GetServices).await
                && !services.is_empty()
            {
                break services;
            }
            assert!(tokio::time::Instant::now() < deadline, "service never appeared");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(services[0].path, "/nuntium/310150123456789");
        assert!(dir.path().join("data").join("store").is_dir());

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
        assert!(!config.socket_path().exists());
    }

    #[tokio::test]
    async fn invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::parse("[[modems]]\nid = \"\"\n").unwrap();
        config.socket_path = Some(dir.path().join("bus.sock"));
        assert!(serve(&config, std::future::pending()).await.is_err());
    }
}
