//! Synchronous driver for the connection manager on virtual time.
//!
//! `ManagerHarness` plays the runtime's role without tasks or channels: it
//! executes [`ManagerAction`]s into plain bookkeeping (armed timers, live
//! transports, writes, closes, published outputs) and lets tests inject
//! [`Operation`]s. Time is a `Duration` since start that only moves on
//! [`Operation::Advance`].

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
    time::Duration,
};

use parley_core::{
    CloseInfo, ConnectionManager, ConnectionParameters, ConnectionStatus, InboundMessage,
    ManagerAction, ManagerConfig, ManagerEvent, NORMAL_CLOSURE, TimerId, TimerKind, TransportId,
};
use parley_proto::MessageKind;
use url::Url;

use crate::invariants::{HarnessSnapshot, InvariantRegistry};

/// One step a test can inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Call `start`.
    Start,
    /// Move virtual time forward, firing every timer that comes due.
    Advance(Duration),
    /// The transport being opened finishes opening.
    CompleteOpen,
    /// The transport being opened fails to open.
    FailOpen,
    /// Report a late open for a transport the manager already abandoned.
    StaleOpen,
    /// The server pushes a well-formed message.
    ServerMessage(InboundMessage),
    /// The server pushes a frame that does not decode.
    MalformedFrame(String),
    /// The server ends the open transport with a closing handshake.
    CloseClean,
    /// The open transport dies abruptly.
    CloseUnclean,
    /// The user sends a message.
    Send(String),
    /// The user disconnects.
    Disconnect,
    /// The owner goes away.
    Teardown,
}

/// Outputs as a consumer would observe them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Last published status
    pub status: ConnectionStatus,
    /// Last published error
    pub error: Option<String>,
    /// Every appended message
    pub messages: Vec<InboundMessage>,
}

/// Synchronous manager driver.
pub struct ManagerHarness {
    manager: ConnectionManager<Duration>,
    now: Duration,
    timers: BTreeMap<TimerId, (TimerKind, Duration)>,
    opening: BTreeSet<TransportId>,
    open: BTreeSet<TransportId>,
    abandoned: BTreeSet<TransportId>,
    opened_urls: Vec<Url>,
    writes: Vec<(TransportId, String)>,
    writes_to_dead: usize,
    closes: Vec<(TransportId, u16, String)>,
    published: Published,
    previous_messages: usize,
    publishes_after_teardown: usize,
    log: Vec<String>,
    invariants: Option<InvariantRegistry>,
}

impl ManagerHarness {
    /// Harness for alice in #general against the default endpoint.
    pub fn new(config: ManagerConfig) -> Self {
        let params = ConnectionParameters::new("alice", "general", "ws://localhost:8080/ws");
        match params {
            Ok(params) => Self::with_params(params, config),
            Err(e) => unreachable!("fixed parameters are valid: {e}"),
        }
    }

    /// Harness for the given parameters.
    pub fn with_params(params: ConnectionParameters, config: ManagerConfig) -> Self {
        let manager = ConnectionManager::new(params, config, Duration::ZERO);
        Self {
            published: Published {
                status: manager.status(),
                error: None,
                messages: Vec::new(),
            },
            manager,
            now: Duration::ZERO,
            timers: BTreeMap::new(),
            opening: BTreeSet::new(),
            open: BTreeSet::new(),
            abandoned: BTreeSet::new(),
            opened_urls: Vec::new(),
            writes: Vec::new(),
            writes_to_dead: 0,
            closes: Vec::new(),
            previous_messages: 0,
            publishes_after_teardown: 0,
            log: Vec::new(),
            invariants: None,
        }
    }

    /// Check invariants after every operation.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// The manager under test.
    pub fn manager(&self) -> &ConnectionManager<Duration> {
        &self.manager
    }

    /// Virtual time since start.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Outputs as published so far.
    pub fn published(&self) -> &Published {
        &self.published
    }

    /// Frames written, with the transport they went to.
    pub fn writes(&self) -> &[(TransportId, String)] {
        &self.writes
    }

    /// Transports closed by the manager, with code and reason.
    pub fn closes(&self) -> &[(TransportId, u16, String)] {
        &self.closes
    }

    /// Addresses of every transport the manager opened.
    pub fn opened_urls(&self) -> &[Url] {
        &self.opened_urls
    }

    /// Armed timers.
    pub fn armed_timers(&self) -> Vec<(TimerKind, Duration)> {
        self.timers.values().copied().collect()
    }

    /// One line per executed action, for snapshot tests.
    pub fn log(&self) -> String {
        self.log.join("\n")
    }

    /// Capture state for invariant checks.
    pub fn snapshot(&self) -> HarnessSnapshot {
        HarnessSnapshot {
            manager: self.manager.snapshot(),
            published: self.published.clone(),
            previous_messages: self.previous_messages,
            armed_timers: self.timers.len(),
            live_transports: self.opening.len() + self.open.len(),
            writes_to_dead: self.writes_to_dead,
            publishes_after_teardown: self.publishes_after_teardown,
        }
    }

    /// Run a whole sequence.
    pub fn run(&mut self, operations: impl IntoIterator<Item = Operation>) {
        for operation in operations {
            self.apply(operation);
        }
    }

    /// Apply one operation and return every action it produced.
    pub fn apply(&mut self, operation: Operation) -> Vec<ManagerAction> {
        self.previous_messages = self.published.messages.len();
        let context = format!("after {operation:?}");

        let actions = match operation {
            Operation::Start => {
                let actions = self.manager.start(self.now).unwrap_or_default();
                self.execute(&actions);
                actions
            },
            Operation::Advance(by) => self.advance(by),
            Operation::CompleteOpen => match self.opening.first().copied() {
                Some(transport) => {
                    self.opening.remove(&transport);
                    self.open.insert(transport);
                    self.deliver(ManagerEvent::TransportOpened { transport })
                },
                None => Vec::new(),
            },
            Operation::FailOpen => match self.opening.pop_first() {
                Some(transport) => {
                    self.abandoned.insert(transport);
                    self.deliver(ManagerEvent::TransportFailed {
                        transport,
                        reason: "refused".to_string(),
                    })
                },
                None => Vec::new(),
            },
            Operation::StaleOpen => match self.abandoned.last().copied() {
                Some(transport) => self.deliver(ManagerEvent::TransportOpened { transport }),
                None => Vec::new(),
            },
            Operation::ServerMessage(message) => match self.open.first().copied() {
                Some(transport) => match message.encode() {
                    Ok(text) => self.deliver(ManagerEvent::FrameReceived { transport, text }),
                    Err(_) => Vec::new(),
                },
                None => Vec::new(),
            },
            Operation::MalformedFrame(text) => match self.open.first().copied() {
                Some(transport) => self.deliver(ManagerEvent::FrameReceived { transport, text }),
                None => Vec::new(),
            },
            Operation::CloseClean => self.end_transport(true),
            Operation::CloseUnclean => self.end_transport(false),
            Operation::Send(content) => {
                let actions = self.manager.send(&content);
                self.execute(&actions);
                actions
            },
            Operation::Disconnect => {
                let actions = self.manager.disconnect(self.now);
                self.execute(&actions);
                actions
            },
            Operation::Teardown => {
                let actions = self.manager.teardown(self.now);
                self.execute(&actions);
                actions
            },
        };

        if let Some(registry) = &self.invariants {
            registry.assert_all(&self.snapshot(), &context);
        }

        actions
    }

    fn advance(&mut self, by: Duration) -> Vec<ManagerAction> {
        let deadline = self.now + by;
        let mut actions = Vec::new();

        loop {
            let due = self
                .timers
                .iter()
                .filter(|(_, (_, at))| *at <= deadline)
                .min_by_key(|(id, (_, at))| (*at, **id))
                .map(|(id, (_, at))| (*id, *at));
            let Some((timer, at)) = due else {
                break;
            };

            self.timers.remove(&timer);
            self.now = self.now.max(at);
            actions.extend(self.deliver(ManagerEvent::TimerFired { timer }));
        }

        self.now = deadline;
        actions
    }

    fn end_transport(&mut self, clean: bool) -> Vec<ManagerAction> {
        let Some(transport) = self.open.pop_first() else {
            return Vec::new();
        };
        self.abandoned.insert(transport);

        let close = if clean {
            CloseInfo::clean(NORMAL_CLOSURE, "server closed")
        } else {
            CloseInfo::abnormal("connection reset")
        };
        self.deliver(ManagerEvent::TransportClosed { transport, close })
    }

    fn deliver(&mut self, event: ManagerEvent) -> Vec<ManagerAction> {
        let actions = self.manager.handle(event, self.now);
        self.execute(&actions);
        actions
    }

    fn execute(&mut self, actions: &[ManagerAction]) {
        for action in actions {
            self.log.push(describe(action));

            match action {
                ManagerAction::StartTimer { timer, kind, delay } => {
                    self.timers.insert(*timer, (*kind, self.now + *delay));
                },
                ManagerAction::CancelTimer { timer } => {
                    self.timers.remove(timer);
                },
                ManagerAction::OpenTransport { transport, url } => {
                    self.opening.insert(*transport);
                    self.opened_urls.push(url.clone());
                },
                ManagerAction::SendText { transport, text } => {
                    if !self.open.contains(transport) {
                        self.writes_to_dead += 1;
                    }
                    self.writes.push((*transport, text.clone()));
                },
                ManagerAction::CloseTransport { transport, code, reason } => {
                    self.opening.remove(transport);
                    self.open.remove(transport);
                    self.abandoned.insert(*transport);
                    self.closes.push((*transport, *code, reason.clone()));
                },
                ManagerAction::StatusChanged(status) => {
                    self.note_publish();
                    self.published.status = *status;
                },
                ManagerAction::ErrorChanged(error) => {
                    self.note_publish();
                    self.published.error.clone_from(error);
                },
                ManagerAction::MessageAppended(message) => {
                    self.note_publish();
                    self.published.messages.push(message.clone());
                },
            }
        }
    }

    fn note_publish(&mut self) {
        if !self.manager.is_active() {
            self.publishes_after_teardown += 1;
        }
    }
}

/// Short, stable rendering of an action.
fn describe(action: &ManagerAction) -> String {
    let mut line = String::new();
    let _ = match action {
        ManagerAction::StartTimer { timer, kind, delay } => {
            write!(line, "start {timer} {kind:?} {delay:?}")
        },
        ManagerAction::CancelTimer { timer } => write!(line, "cancel {timer}"),
        ManagerAction::OpenTransport { transport, url } => write!(line, "open {transport} {url}"),
        ManagerAction::SendText { transport, text } => write!(line, "write {transport} {text}"),
        ManagerAction::CloseTransport { transport, code, reason } => {
            write!(line, "close {transport} {code} {reason}")
        },
        ManagerAction::StatusChanged(status) => write!(line, "status {status}"),
        ManagerAction::ErrorChanged(Some(error)) => write!(line, "error {error}"),
        ManagerAction::ErrorChanged(None) => write!(line, "error cleared"),
        ManagerAction::MessageAppended(message) => {
            write!(line, "message {} {}: {}", message.kind, message.username, message.content)
        },
    };
    line
}

/// Chat message from `username`, as the server would push it.
pub fn chat_message(username: &str, content: &str) -> InboundMessage {
    InboundMessage {
        kind: MessageKind::Message,
        username: username.to_string(),
        user_id: format!("u-{username}"),
        content: content.to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        channel: None,
    }
}
