//! Local IPC bus for nuntium.
//!
//! Clients (messaging front-ends, the radio-side push forwarder, the
//! injection harness) talk to the daemon over a Unix socket. Every frame is
//! length-prefixed JSON:
//! - 4 bytes: message length (u32, big-endian)
//! - N bytes: JSON payload wrapped in an [`Envelope`]
//!
//! A connection that sends [`Request::Subscribe`] then receives a stream of
//! [`Response::Signal`] frames.
//!
//! ```rust
//! use nuntium_protocol::{Envelope, Request, encode_message, decode_message};
//!
//! let request = Envelope::request("req-123", Request::GetServices);
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
//! assert_eq!(decoded, request);
//! ```

mod error;
mod framing;
mod path;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameReader, FrameWriter, decode_message, encode_message};
pub use path::{MANAGER_PATH, ObjectPath};
pub use types::{
    AttachmentInfo, DownloadFailure, Envelope, ErrorCode, ErrorResponse, MessageInfo,
    MessageStatus, OutgoingAttachment, Properties, PropertyValue, Request, Response, ServiceInfo,
    Signal,
};

pub const PROTOCOL_VERSION: &str = "1";

/// Maximum frame size (16 MiB). Attachments travel by path, pushes are small.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Service property names.
pub mod property {
    pub const IDENTITY: &str = "Identity";
    pub const USE_DELIVERY_REPORTS: &str = "UseDeliveryReports";
    pub const MODEM_OBJECT_PATH: &str = "ModemObjectPath";
    pub const PREFERRED_CONTEXT: &str = "PreferredContext";
}
