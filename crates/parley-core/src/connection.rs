//! Connection manager state machine.
//!
//! Owns the lifecycle of one chat session: deferred first connect, reconnects
//! after unclean closes, decoding inbound frames into history, and teardown.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. This keeps the state machine pure (no I/O) and makes
//! testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ grace  ┌────────────┐  opened  ┌───────────┐
//! │ Idle │───────>│ Connecting │─────────>│ Connected │
//! └──────┘        └────────────┘          └───────────┘
//!                    │      ↑                   │
//!       failed/closed│      │retry timer        │closed (clean or unclean)
//!                    ↓      │                   ↓
//!                 ┌──────────────┐<─────────────┘
//!                 │ Disconnected │
//!                 └──────────────┘
//!
//!   any state ── disconnect / teardown ──> Closed
//! ```
//!
//! # Guards
//!
//! Drivers deliver callbacks asynchronously, so an event can arrive after the
//! manager stopped caring about its source. Every handler checks, in order:
//!
//! 1. the instance is still active (not torn down),
//! 2. the event's [`TransportId`] / [`TimerId`] is the current one.
//!
//! Events failing either check are stale and produce no state change.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use parley_proto::{InboundMessage, OutgoingMessage};
use url::Url;

use crate::{
    error::ConnectionError,
    params::ConnectionParameters,
    reconnect::ManagerConfig,
    transport::{CloseInfo, NORMAL_CLOSURE, TimerId, TransportId},
};

/// Error text after a transport failed to open.
pub const ERROR_CONNECTION: &str = "connection error";

/// Error text after an unclean close, while a retry is scheduled.
pub const ERROR_CONNECTION_LOST: &str = "connection lost, reconnecting";

/// Error text after a send attempt without an open transport.
pub const ERROR_NOT_CONNECTED: &str = "cannot send message: not connected";

/// Error text after an unclean close when the reconnect policy gave up.
pub const ERROR_RETRIES_EXHAUSTED: &str = "connection lost, retry limit reached";

/// Close reason sent on explicit disconnect.
pub const REASON_USER_DISCONNECTED: &str = "user disconnected";

/// Close reason sent on teardown.
pub const REASON_SHUTDOWN: &str = "client shut down";

/// Close reason for a transport that opened after it was abandoned.
pub const REASON_STALE: &str = "stale transport";

/// Internal lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, first connect not yet attempted
    Idle,
    /// Transport open in progress
    Connecting,
    /// Transport open
    Connected,
    /// Transport gone; a retry may be pending
    Disconnected,
    /// Disconnected or torn down for good
    Closed,
}

/// Connection status observed by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Waiting for the first connect or a transport to open
    Connecting,
    /// Transport open
    Connected,
    /// No transport
    Disconnected,
}

impl ConnectionStatus {
    /// Lower-case name, as shown to users.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Idle | ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Disconnected | ConnectionState::Closed => Self::Disconnected,
        }
    }
}

/// Purpose of a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Deferred first connect
    ConnectGrace,
    /// Retry after an unclean close or failed open
    Reconnect,
}

/// Events the driver feeds into the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A timer started via [`ManagerAction::StartTimer`] elapsed.
    TimerFired {
        /// Timer that elapsed
        timer: TimerId,
    },

    /// A transport requested via [`ManagerAction::OpenTransport`] is open.
    TransportOpened {
        /// Transport that opened
        transport: TransportId,
    },

    /// A transport could not be opened.
    TransportFailed {
        /// Transport that failed
        transport: TransportId,
        /// Failure description, for logs
        reason: String,
    },

    /// An open transport ended.
    TransportClosed {
        /// Transport that closed
        transport: TransportId,
        /// How it closed
        close: CloseInfo,
    },

    /// A text frame arrived.
    FrameReceived {
        /// Transport the frame arrived on
        transport: TransportId,
        /// Raw frame text
        text: String,
    },
}

/// Actions returned by the manager.
///
/// The driver executes these in order:
/// - `StartTimer` / `CancelTimer`: arm or disarm a one-shot timer
/// - `OpenTransport` / `SendText` / `CloseTransport`: transport I/O
/// - `StatusChanged` / `ErrorChanged` / `MessageAppended`: publish to
///   observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerAction {
    /// Arm a one-shot timer; report expiry as [`ManagerEvent::TimerFired`].
    StartTimer {
        /// Timer to arm
        timer: TimerId,
        /// What the timer is for
        kind: TimerKind,
        /// Time until expiry
        delay: Duration,
    },

    /// Disarm a timer. Its expiry must not be reported.
    CancelTimer {
        /// Timer to disarm
        timer: TimerId,
    },

    /// Open a transport to `url`.
    OpenTransport {
        /// ID to report with this transport's events
        transport: TransportId,
        /// Address including identity query parameters
        url: Url,
    },

    /// Write one text frame.
    SendText {
        /// Transport to write to
        transport: TransportId,
        /// Frame text
        text: String,
    },

    /// Close a transport, or abandon it if it is still opening.
    CloseTransport {
        /// Transport to close
        transport: TransportId,
        /// Close code to send
        code: u16,
        /// Close reason to send
        reason: String,
    },

    /// Observable status changed.
    StatusChanged(ConnectionStatus),

    /// Observable error text changed.
    ErrorChanged(Option<String>),

    /// A message was appended to history.
    MessageAppended(InboundMessage),
}

/// Point-in-time view of manager internals, for invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    /// Internal state
    pub state: ConnectionState,
    /// Observable status
    pub status: ConnectionStatus,
    /// Observable error text
    pub error: Option<String>,
    /// History length
    pub message_count: usize,
    /// Retries since the last successful open
    pub reconnect_attempt: u32,
    /// A transport is open or opening
    pub has_transport: bool,
    /// A timer is armed
    pub has_pending_timer: bool,
    /// Not torn down
    pub active: bool,
    /// Automatic reconnects still allowed
    pub reconnect_enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct TransportSlot {
    id: TransportId,
    open: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    id: TimerId,
    kind: TimerKind,
}

/// Connection manager state machine.
///
/// Owns the session's parameters, observable state (status, error, history),
/// and bookkeeping for the single transport and single timer it may have
/// outstanding.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    params: ConnectionParameters,
    config: ManagerConfig,
    state: ConnectionState,
    status: ConnectionStatus,
    error: Option<String>,
    history: Vec<InboundMessage>,
    /// Cleared by teardown; nothing is published afterwards
    active: bool,
    /// Cleared by disconnect and teardown
    should_reconnect: bool,
    transport: Option<TransportSlot>,
    timer: Option<PendingTimer>,
    next_transport: u64,
    next_timer: u64,
    reconnect_attempt: u32,
    state_since: I,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Idle`].
    ///
    /// Observable status starts as [`ConnectionStatus::Connecting`] since a
    /// connect is about to be attempted.
    pub fn new(params: ConnectionParameters, config: ManagerConfig, now: I) -> Self {
        Self {
            params,
            config,
            state: ConnectionState::Idle,
            status: ConnectionStatus::Connecting,
            error: None,
            history: Vec::new(),
            active: true,
            should_reconnect: true,
            transport: None,
            timer: None,
            next_transport: 0,
            next_timer: 0,
            reconnect_attempt: 0,
            state_since: now,
        }
    }

    /// Session parameters.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Timing configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current internal state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the current state was entered.
    pub fn state_since(&self) -> I {
        self.state_since
    }

    /// Observable status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Observable error text. `None` if nothing is wrong.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Message history in receipt order.
    pub fn messages(&self) -> &[InboundMessage] {
        &self.history
    }

    /// False once torn down.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// False once disconnected or torn down.
    pub fn reconnect_enabled(&self) -> bool {
        self.should_reconnect
    }

    /// Capture internals for invariant checks.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            state: self.state,
            status: self.status,
            error: self.error.clone(),
            message_count: self.history.len(),
            reconnect_attempt: self.reconnect_attempt,
            has_transport: self.transport.is_some(),
            has_pending_timer: self.timer.is_some(),
            active: self.active,
            reconnect_enabled: self.should_reconnect,
        }
    }

    /// Begin the session.
    ///
    /// Arms the connect grace timer; the transport opens when it fires.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if already started, disconnected or
    ///   torn down
    pub fn start(&mut self, _now: I) -> Result<Vec<ManagerAction>, ConnectionError> {
        if !self.active || self.state != ConnectionState::Idle || self.timer.is_some() {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "start".to_string(),
            });
        }

        tracing::debug!(
            username = self.params.username(),
            channel = self.params.channel(),
            grace = ?self.config.connect_grace,
            "deferring first connect"
        );

        let mut actions = Vec::new();
        self.start_timer(&mut actions, TimerKind::ConnectGrace, self.config.connect_grace);
        Ok(actions)
    }

    /// Process an event from the driver.
    pub fn handle(&mut self, event: ManagerEvent, now: I) -> Vec<ManagerAction> {
        match event {
            ManagerEvent::TimerFired { timer } => self.on_timer(timer, now),
            ManagerEvent::TransportOpened { transport } => self.on_opened(transport, now),
            ManagerEvent::TransportFailed { transport, reason } => {
                self.on_failed(transport, &reason, now)
            },
            ManagerEvent::TransportClosed { transport, close } => {
                self.on_closed(transport, &close, now)
            },
            ManagerEvent::FrameReceived { transport, text } => self.on_frame(transport, &text),
        }
    }

    /// Send a chat message.
    ///
    /// Writes only while connected with an open transport. Otherwise nothing
    /// is written and the error becomes [`ERROR_NOT_CONNECTED`]. Never touches
    /// history.
    pub fn send(&mut self, content: &str) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if !self.active {
            tracing::debug!("send after teardown ignored");
            return actions;
        }

        match self.transport {
            Some(slot) if slot.open && self.state == ConnectionState::Connected => {
                match OutgoingMessage::message(content).encode() {
                    Ok(text) => {
                        tracing::debug!(transport = %slot.id, bytes = text.len(), "sending message");
                        actions.push(ManagerAction::SendText { transport: slot.id, text });
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outgoing message");
                    },
                }
            },
            _ => {
                tracing::warn!(state = ?self.state, "cannot send message: not connected");
                self.set_error(&mut actions, Some(ERROR_NOT_CONNECTED));
            },
        }

        actions
    }

    /// Disconnect on user request.
    ///
    /// Idempotent. Disables reconnects for good, cancels any timer, closes
    /// the transport, and publishes `Disconnected` with the error cleared.
    pub fn disconnect(&mut self, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if !self.active {
            return actions;
        }

        if self.state != ConnectionState::Closed {
            tracing::info!(state = ?self.state, "disconnect requested");
        }

        self.should_reconnect = false;
        self.cancel_timer(&mut actions);
        self.close_transport(&mut actions, REASON_USER_DISCONNECTED);
        self.set_state(&mut actions, ConnectionState::Closed, now);
        self.set_error(&mut actions, None);

        actions
    }

    /// Tear down because the owner went away.
    ///
    /// Same resource cleanup as [`Self::disconnect`], but publishes nothing:
    /// the returned actions only cancel timers and close transports. Every
    /// later call is a no-op.
    pub fn teardown(&mut self, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if !self.active {
            return actions;
        }

        tracing::debug!(state = ?self.state, "tearing down connection manager");

        self.active = false;
        self.should_reconnect = false;
        self.cancel_timer(&mut actions);
        self.close_transport(&mut actions, REASON_SHUTDOWN);
        self.set_state(&mut actions, ConnectionState::Closed, now);

        actions
    }

    fn on_timer(&mut self, timer: TimerId, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();

        let pending = match self.timer {
            Some(pending) if pending.id == timer && self.active => pending,
            _ => {
                tracing::debug!(%timer, "ignoring stale timer");
                return actions;
            },
        };
        self.timer = None;

        match pending.kind {
            TimerKind::ConnectGrace if self.state == ConnectionState::Idle => {
                self.open_transport(&mut actions, now);
            },
            TimerKind::Reconnect
                if self.state == ConnectionState::Disconnected && self.should_reconnect =>
            {
                self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                tracing::info!(attempt = self.reconnect_attempt, "attempting to reconnect");
                self.open_transport(&mut actions, now);
            },
            kind => {
                tracing::debug!(%timer, ?kind, state = ?self.state, "timer no longer applicable");
            },
        }

        actions
    }

    fn on_opened(&mut self, transport: TransportId, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();

        let Some(slot) = self.current_transport(transport) else {
            tracing::debug!(%transport, "closing transport that opened after being abandoned");
            actions.push(ManagerAction::CloseTransport {
                transport,
                code: NORMAL_CLOSURE,
                reason: REASON_STALE.to_string(),
            });
            return actions;
        };

        if slot.open {
            tracing::debug!(%transport, "duplicate open notification");
            return actions;
        }

        self.transport = Some(TransportSlot { id: transport, open: true });
        self.reconnect_attempt = 0;
        tracing::info!(
            %transport,
            channel = self.params.channel(),
            waited = ?(now - self.state_since),
            "connected"
        );

        self.set_state(&mut actions, ConnectionState::Connected, now);
        self.set_error(&mut actions, None);
        actions
    }

    fn on_failed(&mut self, transport: TransportId, reason: &str, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if self.current_transport(transport).is_none() {
            tracing::debug!(%transport, "ignoring failure of abandoned transport");
            return actions;
        }

        tracing::warn!(%transport, %reason, "failed to open transport");

        self.transport = None;
        self.set_state(&mut actions, ConnectionState::Disconnected, now);
        self.set_error(&mut actions, Some(ERROR_CONNECTION));
        self.schedule_reconnect(&mut actions, ERROR_CONNECTION);
        actions
    }

    fn on_closed(&mut self, transport: TransportId, close: &CloseInfo, now: I) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if self.current_transport(transport).is_none() {
            tracing::debug!(%transport, %close, "ignoring close of abandoned transport");
            return actions;
        }

        self.transport = None;
        self.set_state(&mut actions, ConnectionState::Disconnected, now);

        if close.clean {
            tracing::info!(%transport, %close, "clean disconnect, not reconnecting");
        } else {
            tracing::warn!(%transport, %close, "connection lost");
            self.schedule_reconnect(&mut actions, ERROR_CONNECTION_LOST);
        }

        actions
    }

    fn on_frame(&mut self, transport: TransportId, text: &str) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        if self.current_transport(transport).is_none() {
            tracing::debug!(%transport, "ignoring frame from abandoned transport");
            return actions;
        }

        match InboundMessage::decode(text) {
            Ok(message) => {
                tracing::trace!(kind = %message.kind, from = %message.username, "received message");
                self.history.push(message.clone());
                actions.push(ManagerAction::MessageAppended(message));
            },
            Err(e) => {
                tracing::warn!(%transport, error = %e, "dropping malformed frame");
            },
        }

        actions
    }

    /// Current transport slot if `transport` is it and the manager is active.
    fn current_transport(&self, transport: TransportId) -> Option<TransportSlot> {
        self.transport.filter(|slot| self.active && slot.id == transport)
    }

    fn open_transport(&mut self, actions: &mut Vec<ManagerAction>, now: I) {
        let id = TransportId(self.next_transport);
        self.next_transport += 1;

        let url = self.params.connect_url();
        tracing::info!(transport = %id, %url, "connecting");

        self.transport = Some(TransportSlot { id, open: false });
        self.set_state(actions, ConnectionState::Connecting, now);
        actions.push(ManagerAction::OpenTransport { transport: id, url });
    }

    fn close_transport(&mut self, actions: &mut Vec<ManagerAction>, reason: &str) {
        if let Some(slot) = self.transport.take() {
            actions.push(ManagerAction::CloseTransport {
                transport: slot.id,
                code: NORMAL_CLOSURE,
                reason: reason.to_string(),
            });
        }
    }

    fn schedule_reconnect(&mut self, actions: &mut Vec<ManagerAction>, error: &str) {
        if !self.should_reconnect {
            return;
        }

        match self.config.reconnect.delay_for_attempt(self.reconnect_attempt) {
            Some(delay) => {
                tracing::info!(?delay, attempt = self.reconnect_attempt + 1, "scheduling reconnect");
                self.set_error(actions, Some(error));
                self.start_timer(actions, TimerKind::Reconnect, delay);
            },
            None => {
                tracing::warn!(attempts = self.reconnect_attempt, "reconnect attempts exhausted");
                self.set_error(actions, Some(ERROR_RETRIES_EXHAUSTED));
            },
        }
    }

    fn start_timer(&mut self, actions: &mut Vec<ManagerAction>, kind: TimerKind, delay: Duration) {
        debug_assert!(self.timer.is_none(), "at most one timer outstanding");
        self.cancel_timer(actions);

        let id = TimerId(self.next_timer);
        self.next_timer += 1;

        self.timer = Some(PendingTimer { id, kind });
        actions.push(ManagerAction::StartTimer { timer: id, kind, delay });
    }

    fn cancel_timer(&mut self, actions: &mut Vec<ManagerAction>) {
        if let Some(pending) = self.timer.take() {
            actions.push(ManagerAction::CancelTimer { timer: pending.id });
        }
    }

    fn set_state(&mut self, actions: &mut Vec<ManagerAction>, state: ConnectionState, now: I) {
        if self.state != state {
            self.state = state;
            self.state_since = now;
        }

        let status = ConnectionStatus::from(state);
        if self.status != status && self.active {
            self.status = status;
            actions.push(ManagerAction::StatusChanged(status));
        }
    }

    fn set_error(&mut self, actions: &mut Vec<ManagerAction>, error: Option<&str>) {
        if self.error.as_deref() != error && self.active {
            self.error = error.map(str::to_string);
            actions.push(ManagerAction::ErrorChanged(self.error.clone()));
        }
    }
}
