//! CLI error types.

use thiserror::Error;

use nuntium_protocol::{ErrorResponse, ProtocolError};
use nuntium_server::ServerError;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the daemon socket failed.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("codec error: {0}")]
    Codec(#[from] nuntium_core::CodecError),

    /// The daemon answered with an error.
    #[error("daemon replied: {0}")]
    Remote(ErrorResponse),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<nuntium_server::StoreError> for CliError {
    fn from(err: nuntium_server::StoreError) -> Self {
        Self::Server(err.into())
    }
}
