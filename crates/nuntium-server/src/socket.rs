//! Unix socket listener for the local bus.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tracing::{debug, error, info, warn};

use nuntium_protocol::{
    Envelope, FrameReader, FrameWriter, PROTOCOL_VERSION, ProtocolError, Request, Response,
    Signal,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

pub struct SocketServer {
    config: ServerConfig,
    listener: UnixListener,
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds the configured socket path.
    ///
    /// An existing socket file nobody answers on is removed first when
    /// `cleanup_stale_socket` is set; a live one is always an error.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if config.cleanup_stale_socket && socket_path.exists() {
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(ServerError::socket_in_use(
                        socket_path.to_string_lossy().to_string(),
                    ));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "Removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        } else if socket_path.exists() {
            return Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            ));
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Socket server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Waits for a connection slot, then for a client.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, _addr) = self.listener.accept().await?;
        debug!("Accepted new connection");

        Ok(Connection::new(stream, self.config.connection_timeout, permit))
    }

    /// Accept loop; each connection runs on its own task.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(ServerError::Shutdown) => return Err(ServerError::Shutdown),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(path = %self.config.socket_path.display(), "Removed socket file");
            }
        }
    }
}

/// One client of the bus.
pub struct Connection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    fn new(stream: UnixStream, timeout: Duration, permit: OwnedSemaphorePermit) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            timeout,
            _permit: permit,
        }
    }

    /// `Ok(None)` when the client hung up between requests.
    pub async fn read_request(&mut self) -> ServerResult<Option<Envelope<Request>>> {
        let envelope: Option<Envelope<Request>> = tokio::time::timeout(self.timeout, self.reader.read_message())
            .await
            .map_err(|_| ProtocolError::Timeout {
                operation: "read request".to_string(),
            })??;

        if let Some(envelope) = &envelope
            && !envelope.is_compatible()
        {
            warn!(
                version = %envelope.protocol_version,
                expected = %PROTOCOL_VERSION,
                "Incompatible protocol version"
            );
        }

        Ok(envelope)
    }

    pub async fn write_response(&mut self, envelope: &Envelope<Response>) -> ServerResult<()> {
        tokio::time::timeout(self.timeout, self.writer.write_message(envelope))
            .await
            .map_err(|_| ProtocolError::Timeout {
                operation: "write response".to_string(),
            })??;
        Ok(())
    }

    pub async fn respond(
        &mut self,
        request_id: impl Into<String>,
        response: Response,
    ) -> ServerResult<()> {
        let envelope = Envelope::response(request_id, response);
        self.write_response(&envelope).await
    }

    /// Forwards bus signals until the client hangs up or sends anything.
    ///
    /// Subscribers may stay idle forever, so no timeout applies here.
    pub async fn stream_signals(
        &mut self,
        request_id: &str,
        mut signals: broadcast::Receiver<Signal>,
    ) -> ServerResult<()> {
        let reader = &mut self.reader;
        let closed = async move {
            let _ = reader.read_message::<Envelope<Request>>().await;
        };
        tokio::pin!(closed);

        loop {
            tokio::select! {
                _ = &mut closed => {
                    debug!("Subscriber left");
                    return Ok(());
                }
                signal = signals.recv() => match signal {
                    Ok(signal) => {
                        let envelope = Envelope::response(request_id, Response::signal(signal));
                        self.writer.write_message(&envelope).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Subscriber fell behind, signals dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}
