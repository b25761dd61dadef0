//! Handle to a running chat session.

use std::sync::Arc;

use parley_core::{
    ConnectionParameters, ConnectionStatus, InboundMessage, ManagerConfig, env::Environment,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    runtime::{Command, Outputs, Runtime},
    transport::Connector,
};

/// One spawned runtime and the channel feeding it.
struct Session {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Session {
    /// Close the command channel and wait for teardown to finish.
    async fn stop(self) {
        drop(self.commands);
        match self.task.await {
            Err(e) if e.is_panic() => tracing::error!(error = %e, "runtime panicked"),
            _ => {},
        }
    }
}

/// Chat session handle.
///
/// Spawns a runtime task that owns the connection manager, and exposes the
/// manager's observable state through watch channels. Methods never block
/// and never fail: sending while disconnected only updates [`Self::error`].
///
/// Dropping the handle tears the session down silently, as if the owning
/// context went away.
///
/// # Example
///
/// ```ignore
/// let params = ConnectionParameters::new("alice", "general", "ws://localhost:8080/ws")?;
/// let client = ChatClient::connect(params, ManagerConfig::default());
///
/// let mut status = client.watch_status();
/// status.wait_for(|s| *s == ConnectionStatus::Connected).await?;
/// client.send_message("hello");
/// ```
pub struct ChatClient<C, E>
where
    C: Connector,
    E: Environment,
{
    params: ConnectionParameters,
    config: ManagerConfig,
    connector: Arc<C>,
    env: E,
    outputs: Arc<Outputs>,
    session: Option<Session>,
}

impl<C, E> ChatClient<C, E>
where
    C: Connector,
    E: Environment,
{
    /// Start a session.
    ///
    /// The first connect happens after [`ManagerConfig::connect_grace`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(params: ConnectionParameters, config: ManagerConfig, connector: C, env: E) -> Self {
        let mut client = Self {
            params,
            config,
            connector: Arc::new(connector),
            env,
            outputs: Arc::new(Outputs::new()),
            session: None,
        };
        client.session = Some(client.start_session());
        client
    }

    fn start_session(&self) -> Session {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let runtime = Runtime::new(
            self.params.clone(),
            self.config.clone(),
            Arc::clone(&self.connector),
            self.env.clone(),
            Arc::clone(&self.outputs),
            commands_rx,
        );

        tracing::info!(
            username = self.params.username(),
            channel = self.params.channel(),
            endpoint = %self.params.endpoint(),
            "starting chat session"
        );
        Session { commands, task: tokio::spawn(runtime.run()) }
    }

    /// Parameters of the current session.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.outputs.status.borrow()
    }

    /// Current error text. `None` if nothing is wrong.
    pub fn error(&self) -> Option<String> {
        self.outputs.error.borrow().clone()
    }

    /// Copy of the message history in receipt order.
    pub fn messages(&self) -> Vec<InboundMessage> {
        self.outputs.messages.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.outputs.status.subscribe()
    }

    /// Subscribe to error changes.
    pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.outputs.error.subscribe()
    }

    /// Subscribe to history changes.
    pub fn watch_messages(&self) -> watch::Receiver<Vec<InboundMessage>> {
        self.outputs.messages.subscribe()
    }

    /// Send a chat message on the current connection.
    pub fn send_message(&self, content: impl Into<String>) {
        self.command(Command::Send(content.into()));
    }

    /// Disconnect for good. Later sends only report "not connected".
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    fn command(&self, command: Command) {
        let Some(session) = &self.session else {
            return;
        };
        if session.commands.send(command).is_err() {
            tracing::debug!("runtime stopped, command dropped");
        }
    }

    /// Switch to new parameters.
    ///
    /// No-op if `params` equals the current parameters. Otherwise the current
    /// session is torn down silently and a new one starts with empty history.
    /// Existing watch receivers stay subscribed across the switch.
    pub async fn retarget(&mut self, params: ConnectionParameters) {
        if params == self.params {
            return;
        }

        tracing::info!(
            from = self.params.channel(),
            to = params.channel(),
            "retargeting chat session"
        );

        if let Some(session) = self.session.take() {
            session.stop().await;
        }

        self.params = params;
        self.outputs.reset();
        self.session = Some(self.start_session());
    }

    /// Tear the session down and wait for the runtime to finish.
    ///
    /// Publishes nothing; status and error keep their last values.
    pub async fn shutdown(mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
        }
    }
}
