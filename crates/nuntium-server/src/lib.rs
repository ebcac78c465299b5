//! The nuntium daemon.
//!
//! - one [`Mediator`] task per modem, driving notification retrieval and
//!   message submission over the modem's MMS bearer
//! - an on-disk [`MmsStore`] that lets interrupted transactions resume
//!   after a restart
//! - the [`Bus`] object tree, served to local clients over a Unix socket
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nuntium_server::{Bus, PreferredContexts, ServerConfig, SocketServer, make_connection_handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Arc::new(Bus::new());
//!     let preferred = Arc::new(PreferredContexts::new("/tmp/nuntium".as_ref()));
//!     let server = SocketServer::new(ServerConfig::default()).await?;
//!     server.run(make_connection_handler(bus, preferred)).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handler;
mod mediator;
mod preferred;
mod service;
mod signals;
mod socket;
mod store;
mod transfer;

#[cfg(test)]
mod testing;

pub use config::{MediatorConfig, ServerConfig, default_socket_path};
pub use error::{ServerError, ServerResult, StoreError, StoreResult};
pub use handler::{RequestHandler, make_connection_handler};
pub use mediator::{DEFERRED_ERROR, Mediator, MediatorEvent, MediatorHandle, MediatorServices};
pub use preferred::PreferredContexts;
pub use service::{Bus, MessagingService, ServiceRegistration, message_path};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, SocketServer};
pub use store::{MessageState, MmsState, MmsStore};
