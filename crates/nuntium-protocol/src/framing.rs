//! Length-prefixed message framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! The same framing carries requests, responses and the signal stream of
//! subscribed connections.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Encodes a message with its length prefix.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = u32::try_from(json.len()).unwrap_or(u32::MAX);
    check_len(len)?;

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes one complete frame (length prefix + payload).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<4>() else {
        return Err(ProtocolError::TruncatedFrame {
            expected: 4,
            received: data.len(),
        });
    };
    let len = u32::from_be_bytes(*prefix);
    check_len(len)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(ProtocolError::TruncatedFrame {
            expected: 4 + len,
            received: data.len(),
        });
    }
    Ok(serde_json::from_slice(&rest[..len])?)
}

fn check_len(len: u32) -> ProtocolResult<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one message. `Ok(None)` means the stream ended cleanly
    /// between frames.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> ProtocolResult<Option<T>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf);
        check_len(len)?;
        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::TruncatedFrame {
                    expected: len as usize,
                    received: 0,
                }
            } else {
                e.into()
            }
        })?;
        Ok(Some(serde_json::from_slice(&payload)?))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes and flushes one message.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> ProtocolResult<()> {
        let data = encode_message(message)?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
