//! In-memory transports for runtime tests.
//!
//! [`SimConnector`] implements [`Connector`] without any network. Every
//! successful connect hands the server side of the new transport, a
//! [`SimPeer`], to the test through a [`SimListener`]. Tests then play the
//! server: push frames, read what the client wrote, and end the transport
//! cleanly or abruptly.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use parley_client::{Connector, Outbound, TransportError, TransportEvent, TransportHandle};
use parley_core::CloseInfo;
use parley_proto::InboundMessage;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Default)]
struct Shared {
    attempts: Vec<Url>,
    refuse: u32,
    connect_delay: Duration,
}

/// Connector producing in-memory transports.
#[derive(Debug, Clone)]
pub struct SimConnector {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedSender<SimPeer>,
}

impl SimConnector {
    /// Create a connector and the listener receiving its peers.
    pub fn new() -> (Self, SimListener) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Self { shared: Arc::new(Mutex::new(Shared::default())), peers };
        (connector, SimListener { peers: peers_rx })
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` connect attempts.
    pub fn refuse_next(&self, count: u32) {
        self.lock().refuse = count;
    }

    /// Delay every connect attempt by `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Addresses of all connect attempts so far, in order.
    pub fn attempts(&self) -> Vec<Url> {
        self.lock().attempts.clone()
    }

    /// Number of connect attempts so far.
    pub fn attempt_count(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Record an attempt; returns the delay and whether to refuse it.
    fn begin_attempt(&self, url: &Url) -> (Duration, bool) {
        let mut shared = self.lock();
        shared.attempts.push(url.clone());
        let refuse = shared.refuse > 0;
        if refuse {
            shared.refuse -= 1;
        }
        (shared.connect_delay, refuse)
    }
}

impl Connector for SimConnector {
    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<TransportHandle, TransportError>> + Send {
        let (delay, refuse) = self.begin_attempt(&url);
        let peers = self.peers.clone();

        async move {
            if !delay.is_zero() {
                #[allow(clippy::disallowed_methods)]
                tokio::time::sleep(delay).await;
            }

            if refuse {
                tracing::debug!(%url, "refusing simulated connect");
                return Err(TransportError::Connection("connection refused".to_string()));
            }

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

            peers
                .send(SimPeer { url, from_client: outbound_rx, to_client: inbound_tx })
                .map_err(|_| TransportError::Connection("listener dropped".to_string()))?;

            Ok(TransportHandle::new(outbound_tx, inbound_rx))
        }
    }
}

/// Receives the server side of each transport a [`SimConnector`] opens.
#[derive(Debug)]
pub struct SimListener {
    peers: mpsc::UnboundedReceiver<SimPeer>,
}

impl SimListener {
    /// Wait for the next opened transport.
    pub async fn accept(&mut self) -> Option<SimPeer> {
        self.peers.recv().await
    }

    /// Next opened transport, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<SimPeer> {
        self.peers.try_recv().ok()
    }
}

/// Server side of one simulated transport.
#[derive(Debug)]
pub struct SimPeer {
    url: Url,
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl SimPeer {
    /// Address the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of query parameter `key` in the connect address.
    pub fn query(&self, key: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
    }

    /// Push a message to the client.
    pub fn push(&self, message: &InboundMessage) {
        if let Ok(text) = message.encode() {
            self.push_raw(text);
        }
    }

    /// Push raw frame text to the client.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Frame(text.into()));
    }

    /// Wait for the next instruction the client sent. `None` once the client
    /// dropped its handle.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    /// Next instruction the client sent, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.from_client.try_recv().ok()
    }

    /// End the transport with a completed closing handshake.
    pub fn close_clean(self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed(CloseInfo::clean(code, reason)));
    }

    /// End the transport abruptly.
    pub fn drop_connection(self) {
        let _ = self.to_client.send(TransportEvent::Closed(CloseInfo::abnormal("connection reset")));
    }
}
