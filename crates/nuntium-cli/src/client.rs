//! Unix socket client for the daemon's bus.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, warn};
use uuid::Uuid;

use nuntium_protocol::{Envelope, FrameReader, FrameWriter, Request, Response};

use crate::error::{CliError, CliResult};

pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(nuntium_server::default_socket_path(), Duration::from_secs(5))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// One request on a fresh connection.
    pub async fn send(&self, request: Request) -> CliResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        let envelope = Envelope::request(&request_id, request);

        debug!(
            socket = %self.socket_path.display(),
            request_id = %request_id,
            "connecting to daemon"
        );

        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                CliError::Connection(format!(
                    "connection timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                CliError::Connection(format!(
                    "failed to connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;

        let (read_half, write_half) = stream.into_split();
        let mut writer = FrameWriter::new(write_half);
        let mut reader = FrameReader::new(read_half);

        tokio::time::timeout(self.timeout, writer.write_message(&envelope))
            .await
            .map_err(|_| CliError::Timeout("sending request".into()))??;

        let response: Envelope<Response> =
            tokio::time::timeout(self.timeout, reader.read_message())
                .await
                .map_err(|_| CliError::Timeout("reading response".into()))??
                .ok_or_else(|| CliError::Connection("daemon closed the connection".into()))?;

        if response.request_id != request_id {
            warn!(
                expected = %request_id,
                received = %response.request_id,
                "response request_id mismatch"
            );
        }

        Ok(response.payload)
    }

    /// Like [`send`](Self::send), with error replies turned into `Err`.
    pub async fn call(&self, request: Request) -> CliResult<Response> {
        match self.send(request).await? {
            Response::Error { error } => Err(CliError::Remote(error)),
            response => Ok(response),
        }
    }

    pub async fn ping(&self) -> bool {
        matches!(self.send(Request::Ping).await, Ok(Response::Pong))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nuntium_protocol::ErrorCode;
    use nuntium_server::{Bus, PreferredContexts, ServerConfig, SocketServer, make_connection_handler};

    #[test]
    fn socket_client_creation() {
        let client = SocketClient::new("/tmp/nuntium-test.sock", Duration::from_secs(10));
        assert_eq!(client.socket_path(), Path::new("/tmp/nuntium-test.sock"));
        assert!(!client.socket_exists());
    }

    #[test]
    fn default_client() {
        let client = SocketClient::with_defaults();
        assert!(client.socket_path().to_string_lossy().contains("nuntium"));
    }

    #[tokio::test]
    async fn missing_daemon_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = SocketClient::new(dir.path().join("none.sock"), Duration::from_secs(1));
        assert!(!client.ping().await);
        assert!(matches!(
            client.send(Request::Ping).await,
            Err(CliError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn talks_to_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bus.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path)).await.unwrap();
        let handler = make_connection_handler(
            Arc::new(Bus::new()),
            Arc::new(PreferredContexts::new(dir.path())),
        );
        tokio::spawn(async move {
            let _ = server.run(handler).await;
        });

        let client = SocketClient::new(&socket_path, Duration::from_secs(5));
        assert!(client.ping().await);
        assert_eq!(
            client.call(Request::GetServices).await.unwrap(),
            Response::Services {
                services: Vec::new()
            }
        );
        match client.call(Request::get_messages("/nuntium/404")).await {
            Err(CliError::Remote(error)) => assert_eq!(error.code, ErrorCode::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }
}
