//! Bearer handling for MMS transfers.
//!
//! MMS content travels over a packet-data context that may have to be
//! brought up for the transfer and taken down afterwards. This crate holds
//! the context model and selection order, activation with bounded retry
//! against the [`Modem`] seam, and the HTTP [`Transport`] seam.

pub mod context;
pub mod error;
pub mod modem;
pub mod transport;

pub use context::{BearerContext, ContextKind, DEFAULT_PROXY_PORT, Proxy, select_contexts};
pub use error::{BearerError, BearerResult};
pub use modem::{
    ACTIVATION_ATTEMPTS, ACTIVATION_RETRY_DELAY, Bearer, BoxFuture, Modem, SharedModem,
    StaticModem, set_active_with_retry,
};
pub use transport::{HttpConfig, HttpTransport, MMS_CONTENT_TYPE, Transport};
