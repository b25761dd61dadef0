//! Transport abstraction between the runtime and the network.
//!
//! A [`Connector`] opens transports; each open transport is a
//! [`TransportHandle`] carrying a pair of channels. A socket task on the other
//! end does the actual I/O, so the runtime never blocks on the network.

use std::future::Future;

use parley_core::CloseInfo;
use tokio::{sync::mpsc, task::AbortHandle};
use url::Url;

use crate::error::TransportError;

/// Instruction for a transport's socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Text(String),

    /// Perform the closing handshake and stop.
    Close {
        /// Close code to send
        code: u16,
        /// Close reason to send
        reason: String,
    },
}

/// Notification from a transport's socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),

    /// The transport ended. Always the last event.
    Closed(CloseInfo),
}

/// Opens transports.
///
/// Implemented by [`crate::ws::WsConnector`] for real WebSockets and by the
/// simulation harness for in-memory peers.
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    ///
    /// Resolves once the transport is open and ready for frames.
    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<TransportHandle, TransportError>> + Send;
}

/// Channels to one open transport.
///
/// Dropping the handle ends the outbound channel, which tells the socket task
/// to close the connection.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<AbortHandle>,
}

impl TransportHandle {
    /// Wrap the channels of a socket task.
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound, task: None }
    }

    /// Attach the socket task so [`Self::abort`] can stop it.
    #[must_use]
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Queue an instruction for the socket task.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` if the socket task has stopped
    pub fn send(&self, outbound: Outbound) -> Result<(), TransportError> {
        self.outbound.send(outbound).map_err(|_| TransportError::Closed)
    }

    /// Next event from the socket task.
    ///
    /// `None` once the task has stopped and all events were taken. A task that
    /// stops without sending [`TransportEvent::Closed`] ended abnormally.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    /// Stop the socket task immediately, without a closing handshake.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
