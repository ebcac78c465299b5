//! Server error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the on-disk message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state record {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no stored message {0}")]
    NotFound(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] nuntium_protocol::ProtocolError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bearer(#[from] nuntium_bearer::BearerError),

    #[error("Codec error: {0}")]
    Codec(#[from] nuntium_core::CodecError),

    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    #[error("Socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The mediator owning the object is gone.
    #[error("Mediator for {0} is not running")]
    Unavailable(String),

    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}
