//! Error types for the connection manager.
//!
//! Transport failures are not errors at this layer: they are events fed into
//! the state machine and surfaced to users as error text. The types here cover
//! misuse of the API and invalid connection parameters.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors from driving the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: String,
    },
}

/// Errors from validating [`crate::ConnectionParameters`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// A required field was empty or whitespace
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the empty field
        field: &'static str,
    },

    /// Endpoint is not a valid URL
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidUrl {
        /// Endpoint as supplied
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Endpoint scheme is not `ws` or `wss`
    #[error("unsupported endpoint scheme {scheme:?} (expected ws or wss)")]
    UnsupportedScheme {
        /// Scheme as parsed
        scheme: String,
    },
}
