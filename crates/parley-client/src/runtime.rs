//! Event loop driving one [`ConnectionManager`].
//!
//! The Runtime owns the manager and executes its actions:
//! - timers become spawned tasks sleeping on [`Environment::sleep`]
//! - transport opens become spawned tasks calling the [`Connector`]
//! - transport I/O goes through the open [`TransportHandle`]
//! - observable changes are published on watch channels
//!
//! Commands, timer expiries, connect results and transport events are
//! processed one at a time, so the manager never sees concurrent calls.

use std::{collections::HashMap, sync::Arc};

use parley_core::{
    CloseInfo, ConnectionManager, ConnectionParameters, ConnectionStatus, InboundMessage,
    ManagerAction, ManagerConfig, ManagerEvent, TimerId, TransportId, env::Environment,
};
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
};

use crate::{
    error::TransportError,
    transport::{Connector, Outbound, TransportEvent, TransportHandle},
};

/// Requests from the [`crate::ChatClient`] handle.
#[derive(Debug)]
pub(crate) enum Command {
    Send(String),
    Disconnect,
}

/// Completions of tasks spawned by the runtime.
enum Internal {
    TimerFired(TimerId),
    Connected { transport: TransportId, result: Result<TransportHandle, TransportError> },
}

/// Watch channels carrying the manager's observable state.
#[derive(Debug)]
pub(crate) struct Outputs {
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) error: watch::Sender<Option<String>>,
    pub(crate) messages: watch::Sender<Vec<InboundMessage>>,
}

impl Outputs {
    pub(crate) fn new() -> Self {
        Self {
            status: watch::channel(ConnectionStatus::Connecting).0,
            error: watch::channel(None).0,
            messages: watch::channel(Vec::new()).0,
        }
    }

    /// Back to the values of a fresh session.
    pub(crate) fn reset(&self) {
        self.status.send_replace(ConnectionStatus::Connecting);
        self.error.send_replace(None);
        self.messages.send_replace(Vec::new());
    }
}

/// Runtime for one session.
pub(crate) struct Runtime<C, E>
where
    C: Connector,
    E: Environment,
{
    manager: ConnectionManager<E::Instant>,
    connector: Arc<C>,
    env: E,
    outputs: Arc<Outputs>,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    timers: HashMap<TimerId, AbortHandle>,
    pending_connects: HashMap<TransportId, AbortHandle>,
    transport: Option<(TransportId, TransportHandle)>,
}

impl<C, E> Runtime<C, E>
where
    C: Connector,
    E: Environment,
{
    pub(crate) fn new(
        params: ConnectionParameters,
        config: ManagerConfig,
        connector: Arc<C>,
        env: E,
        outputs: Arc<Outputs>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let manager = ConnectionManager::new(params, config, env.now());
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        Self {
            manager,
            connector,
            env,
            outputs,
            commands,
            internal_tx,
            internal_rx,
            timers: HashMap::new(),
            pending_connects: HashMap::new(),
            transport: None,
        }
    }

    /// Run until the command channel closes, then tear down.
    pub(crate) async fn run(mut self) {
        match self.manager.start(self.env.now()) {
            Ok(actions) => self.execute(actions),
            Err(e) => {
                tracing::error!(error = %e, "failed to start connection manager");
                return;
            },
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal),
                (transport, event) = next_transport_event(&mut self.transport) => {
                    self.on_transport_event(transport, event);
                },
            }
        }

        let actions = self.manager.teardown(self.env.now());
        self.execute(actions);

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for (_, connect) in self.pending_connects.drain() {
            connect.abort();
        }

        tracing::debug!(channel = self.manager.params().channel(), "runtime stopped");
    }

    fn on_command(&mut self, command: Command) {
        let actions = match command {
            Command::Send(content) => self.manager.send(&content),
            Command::Disconnect => self.manager.disconnect(self.env.now()),
        };
        self.execute(actions);
    }

    fn on_internal(&mut self, internal: Internal) {
        let now = self.env.now();
        let actions = match internal {
            Internal::TimerFired(timer) => {
                self.timers.remove(&timer);
                self.manager.handle(ManagerEvent::TimerFired { timer }, now)
            },
            Internal::Connected { transport, result } => {
                self.pending_connects.remove(&transport);
                match result {
                    // A stale open is closed again by the manager's answer
                    Ok(handle) => {
                        self.transport = Some((transport, handle));
                        self.manager.handle(ManagerEvent::TransportOpened { transport }, now)
                    },
                    Err(e) => self.manager.handle(
                        ManagerEvent::TransportFailed { transport, reason: e.to_string() },
                        now,
                    ),
                }
            },
        };
        self.execute(actions);
    }

    fn on_transport_event(&mut self, transport: TransportId, event: Option<TransportEvent>) {
        let now = self.env.now();
        let event = match event {
            Some(TransportEvent::Frame(text)) => ManagerEvent::FrameReceived { transport, text },
            Some(TransportEvent::Closed(close)) => {
                self.transport = None;
                ManagerEvent::TransportClosed { transport, close }
            },
            None => {
                self.transport = None;
                ManagerEvent::TransportClosed {
                    transport,
                    close: CloseInfo::abnormal("transport stopped without close"),
                }
            },
        };

        let actions = self.manager.handle(event, now);
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<ManagerAction>) {
        for action in actions {
            match action {
                ManagerAction::StartTimer { timer, kind, delay } => {
                    tracing::trace!(%timer, ?kind, ?delay, "starting timer");
                    let env = self.env.clone();
                    let tx = self.internal_tx.clone();
                    let task = tokio::spawn(async move {
                        env.sleep(delay).await;
                        let _ = tx.send(Internal::TimerFired(timer));
                    });
                    self.timers.insert(timer, task.abort_handle());
                },
                ManagerAction::CancelTimer { timer } => {
                    if let Some(task) = self.timers.remove(&timer) {
                        task.abort();
                    }
                },
                ManagerAction::OpenTransport { transport, url } => {
                    let connector = Arc::clone(&self.connector);
                    let tx = self.internal_tx.clone();
                    let task = tokio::spawn(async move {
                        let result = connector.connect(url).await;
                        let _ = tx.send(Internal::Connected { transport, result });
                    });
                    self.pending_connects.insert(transport, task.abort_handle());
                },
                ManagerAction::SendText { transport, text } => match &self.transport {
                    Some((id, handle)) if *id == transport => {
                        if let Err(e) = handle.send(Outbound::Text(text)) {
                            tracing::warn!(%transport, error = %e, "failed to queue frame");
                        }
                    },
                    _ => tracing::warn!(%transport, "send to unknown transport dropped"),
                },
                ManagerAction::CloseTransport { transport, code, reason } => {
                    self.close_transport(transport, code, reason);
                },
                ManagerAction::StatusChanged(status) => {
                    self.outputs.status.send_replace(status);
                },
                ManagerAction::ErrorChanged(error) => {
                    self.outputs.error.send_replace(error);
                },
                ManagerAction::MessageAppended(message) => {
                    self.outputs.messages.send_modify(|history| history.push(message));
                },
            }
        }
    }

    fn close_transport(&mut self, transport: TransportId, code: u16, reason: String) {
        if let Some(connect) = self.pending_connects.remove(&transport) {
            tracing::debug!(%transport, "aborting connect attempt");
            connect.abort();
            return;
        }

        let is_current = matches!(&self.transport, Some((id, _)) if *id == transport);
        if !is_current {
            return;
        }

        if let Some((_, handle)) = self.transport.take() {
            // Dropping the handle afterwards leaves the socket task to finish the handshake
            if handle.send(Outbound::Close { code, reason }).is_err() {
                handle.abort();
            }
        }
    }
}

/// Next event from the open transport; pending forever when there is none.
async fn next_transport_event(
    transport: &mut Option<(TransportId, TransportHandle)>,
) -> (TransportId, Option<TransportEvent>) {
    match transport {
        Some((id, handle)) => (*id, handle.recv().await),
        None => std::future::pending().await,
    }
}
