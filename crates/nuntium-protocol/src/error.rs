//! Errors raised while moving frames over the bus socket.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The length prefix exceeds what a frame may carry.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },

    /// A zero length prefix.
    #[error("empty frame")]
    EmptyFrame,

    /// The peer closed the connection in the middle of a frame.
    #[error("truncated frame: expected {expected} bytes, got {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    /// An object path that does not name the manager, a service, a message
    /// or a push agent.
    #[error("invalid object path: {0}")]
    InvalidPath(String),
}
