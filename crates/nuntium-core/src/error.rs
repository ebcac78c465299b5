//! Codec error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while reading or writing the WSP/MMS wire format.
///
/// Every error is fatal for the PDU being processed; the decoders never
/// hand out a partially populated record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended before the value was complete.
    #[error("short read at offset {offset}: needed {needed} byte(s), {available} available")]
    ShortRead {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The bytes do not form a valid value of the expected kind.
    #[error("bad encoding at offset {offset}: {reason}")]
    BadEncoding { offset: usize, reason: String },

    /// The message-type header does not match the record being decoded.
    #[error("unexpected message type {found:#04x}, expected {expected:#04x}")]
    UnexpectedType { expected: u8, found: u8 },

    /// A charset that cannot be mapped or converted.
    #[error("unknown charset {0}")]
    UnknownCharset(String),

    /// The WSP PDU is not a push.
    #[error("not a push PDU (pdu type {0:#04x})")]
    NotAPush(u8),

    /// A well-known MMS field that the target PDU does not define.
    #[error("field {field:#04x} is not part of {pdu}")]
    UnexpectedField { field: u8, pdu: &'static str },
}

impl CodecError {
    pub(crate) fn bad_encoding(offset: usize, reason: impl Into<String>) -> Self {
        Self::BadEncoding {
            offset,
            reason: reason.into(),
        }
    }
}

/// A decode failure together with the field trace accumulated up to it.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct DecodeError {
    /// What went wrong.
    pub error: CodecError,
    /// Human-readable trace of every field decoded before the failure.
    pub log: String,
}

impl DecodeError {
    pub fn new(error: CodecError, log: impl Into<String>) -> Self {
        Self {
            error,
            log: log.into(),
        }
    }
}

impl From<CodecError> for DecodeError {
    fn from(error: CodecError) -> Self {
        Self::new(error, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offsets() {
        let err = CodecError::ShortRead {
            offset: 4,
            needed: 2,
            available: 1,
        };
        let text = err.to_string();
        assert!(text.contains("offset 4"));
        assert!(text.contains("needed 2"));
    }

    #[test]
    fn decode_error_keeps_log() {
        let err = DecodeError::new(
            CodecError::UnexpectedType {
                expected: 0x82,
                found: 0x84,
            },
            "X-Mms-Message-Type: 0x84\n",
        );
        assert!(err.to_string().contains("0x84"));
        assert!(err.log.contains("X-Mms-Message-Type"));
    }
}
