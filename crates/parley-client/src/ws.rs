//! WebSocket transport for the client.
//!
//! Provides [`WsConnector`] which opens WebSocket connections with
//! tokio-tungstenite. This is a thin layer that just moves text frames - all
//! connection lifecycle logic remains in the sans-IO
//! [`parley_core::ConnectionManager`].

use std::{future::Future, time::Duration};

use futures::{SinkExt, StreamExt};
use parley_core::{ABNORMAL_CLOSURE, CloseInfo};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_tungstenite::{
    WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

use crate::{
    error::TransportError,
    transport::{Connector, Outbound, TransportEvent, TransportHandle},
};

/// Default limit for opening a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default limit for the closing handshake.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Limit for the TCP connect and WebSocket upgrade
    pub connect_timeout: Duration,
    /// Limit for waiting on the peer's close reply
    pub close_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT, close_timeout: DEFAULT_CLOSE_TIMEOUT }
    }
}

/// Opens WebSocket transports.
///
/// `wss://` endpoints use rustls with the webpki root certificates.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: TransportConfig,
}

impl WsConnector {
    /// Create a connector with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<TransportHandle, TransportError>> + Send {
        let config = self.config.clone();
        install_crypto_provider();
        async move {
            let (stream, _response) =
                tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
                    .await
                    .map_err(|_| TransportError::Timeout(config.connect_timeout))?
                    .map_err(|e| TransportError::Connection(e.to_string()))?;

            tracing::debug!(%url, "websocket open");
            Ok(spawn_socket(stream, config.close_timeout))
        }
    }
}

/// Select ring as the process-wide rustls provider unless one is already set.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

/// Spawn the socket task for an open WebSocket and return its handle.
pub fn spawn_socket<S>(stream: WebSocketStream<S>, close_timeout: Duration) -> TransportHandle
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(run_socket(stream, outbound_rx, inbound_tx, close_timeout));

    TransportHandle::new(outbound_tx, inbound_rx).with_task(task.abort_handle())
}

/// Run the socket, bridging between channels and the WebSocket.
async fn run_socket<S>(
    stream: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    close_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();
    let mut peer_close: Option<CloseInfo> = None;

    let close = loop {
        tokio::select! {
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(TransportEvent::Frame(text.as_str().to_owned()));
                },
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    let _ = inbound.send(TransportEvent::Frame(text));
                },
                Some(Ok(Message::Close(frame))) => {
                    // The close reply is queued by tungstenite; the stream ends after it
                    let info = match frame {
                        Some(frame) => {
                            CloseInfo::clean(u16::from(frame.code), frame.reason.as_str())
                        },
                        None => CloseInfo { code: None, reason: String::new(), clean: true },
                    };
                    peer_close = Some(info);
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break CloseInfo::abnormal(e.to_string()),
                None => {
                    break peer_close.take().unwrap_or_else(|| {
                        CloseInfo {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: "connection closed without close frame".to_string(),
                            clean: false,
                        }
                    });
                },
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break CloseInfo::abnormal(e.to_string());
                    }
                },
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "close frame not sent");
                        return;
                    }

                    // Drain until the peer's reply ends the stream
                    let drained = tokio::time::timeout(close_timeout, async {
                        while let Some(Ok(_)) = source.next().await {}
                    })
                    .await;
                    if drained.is_err() {
                        tracing::debug!(?close_timeout, "peer did not finish closing handshake");
                    }
                    return;
                },
                None => {
                    // Handle dropped without an explicit close
                    let _ = sink.close().await;
                    return;
                },
            },
        }
    };

    tracing::debug!(%close, "websocket ended");
    let _ = inbound.send(TransportEvent::Closed(close));
}
