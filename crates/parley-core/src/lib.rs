//! Connection manager core.
//!
//! Pure state machine for the chat client's connection lifecycle: deferred
//! first connect, reconnect on unclean close, frame decoding into history, and
//! teardown. Methods take time as input and return [`ManagerAction`]s for a
//! driver to execute, so the same logic runs against a real WebSocket and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`ConnectionManager`]: lifecycle state machine and message history
//! - [`ConnectionParameters`]: identity, channel and endpoint for one session
//! - [`ManagerConfig`] / [`ReconnectPolicy`]: timing configuration
//! - [`env::Environment`]: time abstraction for drivers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
mod params;
mod reconnect;
pub mod transport;

pub use connection::{
    ConnectionManager, ConnectionState, ConnectionStatus, ERROR_CONNECTION, ERROR_CONNECTION_LOST,
    ERROR_NOT_CONNECTED, ERROR_RETRIES_EXHAUSTED, ManagerAction, ManagerEvent, ManagerSnapshot,
    REASON_SHUTDOWN, REASON_STALE, REASON_USER_DISCONNECTED, TimerKind,
};
pub use error::{ConnectionError, ParamsError};
pub use params::ConnectionParameters;
pub use parley_proto::{InboundMessage, MessageKind, OutgoingMessage};
pub use reconnect::{DEFAULT_CONNECT_GRACE, DEFAULT_RECONNECT_DELAY, ManagerConfig, ReconnectPolicy};
pub use transport::{ABNORMAL_CLOSURE, CloseInfo, NORMAL_CLOSURE, TimerId, TransportId};
