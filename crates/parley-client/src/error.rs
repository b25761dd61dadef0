//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from opening or using a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection was not established within the configured timeout.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The transport's socket task has stopped.
    #[error("transport closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_cause() {
        assert_eq!(
            TransportError::Connection("refused".to_string()).to_string(),
            "connection failed: refused"
        );
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(5)).to_string(),
            "connection timed out after 5s"
        );
    }
}
