//! Client runtime
//!
//! Drives the sans-IO [`parley_core::ConnectionManager`] on tokio: executes
//! its timer and transport actions, feeds transport events back in, and
//! publishes status, error and message history through watch channels.
//!
//! # Components
//!
//! - [`ChatClient`]: handle to a running session
//! - [`Connector`] / [`TransportHandle`]: transport abstraction
//! - [`SystemEnv`]: production [`Environment`] using real time
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`ws::WsConnector`]: WebSocket connector built on tokio-tungstenite
//! - [`ChatClient::connect`]: start a session over WebSocket

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod runtime;
mod system_env;
pub mod transport;

#[cfg(feature = "transport")]
pub mod ws;

pub use client::ChatClient;
pub use error::TransportError;
pub use parley_core::{
    ConnectionParameters, ConnectionStatus, InboundMessage, ManagerConfig, MessageKind,
    ReconnectPolicy, env::Environment,
};
pub use system_env::SystemEnv;
pub use transport::{Connector, Outbound, TransportEvent, TransportHandle};

/// Chat client over real WebSockets and system time.
#[cfg(feature = "transport")]
pub type WsChatClient = ChatClient<ws::WsConnector, SystemEnv>;

#[cfg(feature = "transport")]
impl WsChatClient {
    /// Start a session over WebSocket with default transport settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn connect(params: ConnectionParameters, config: ManagerConfig) -> Self {
        Self::spawn(params, config, ws::WsConnector::default(), SystemEnv::new())
    }
}
