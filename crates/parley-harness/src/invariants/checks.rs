//! Standard invariant checks.
//!
//! These capture properties that must hold after every operation, whatever
//! sequence led there.

use parley_core::{
    ConnectionState, ConnectionStatus, ERROR_CONNECTION, ERROR_CONNECTION_LOST,
    ERROR_NOT_CONNECTED, ERROR_RETRIES_EXHAUSTED,
};

use super::{HarnessSnapshot, Invariant, InvariantResult, Violation};

/// Status is a function of state.
///
/// `Idle` and `Connecting` show as connecting, `Closed` and `Disconnected`
/// as disconnected. Teardown freezes the status, so only active managers are
/// checked.
pub struct StatusFollowsState;

impl Invariant for StatusFollowsState {
    fn name(&self) -> &'static str {
        "status_follows_state"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        let manager = &state.manager;
        if manager.active && manager.status != ConnectionStatus::from(manager.state) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("state {:?} shown as {}", manager.state, manager.status),
            });
        }
        Ok(())
    }
}

/// Observers see exactly the manager's status, error and history.
pub struct PublishedMatchesManager;

impl Invariant for PublishedMatchesManager {
    fn name(&self) -> &'static str {
        "published_matches_manager"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        let manager = &state.manager;
        let published = &state.published;

        let mismatch = if published.status != manager.status {
            Some(format!("status {} published, manager has {}", published.status, manager.status))
        } else if published.error != manager.error {
            Some(format!("error {:?} published, manager has {:?}", published.error, manager.error))
        } else if published.messages.len() != manager.message_count {
            Some(format!(
                "{} messages published, manager has {}",
                published.messages.len(),
                manager.message_count
            ))
        } else {
            None
        };

        match mismatch {
            Some(message) => Err(Violation { invariant: self.name(), message }),
            None => Ok(()),
        }
    }
}

/// At most one timer is armed, and the manager knows about it.
pub struct SingleTimer;

impl Invariant for SingleTimer {
    fn name(&self) -> &'static str {
        "single_timer"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        let expected = usize::from(state.manager.has_pending_timer);
        if state.armed_timers != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} timers armed, manager tracks {expected}",
                    state.armed_timers
                ),
            });
        }
        Ok(())
    }
}

/// At most one transport is live, and the manager knows about it.
pub struct SingleTransport;

impl Invariant for SingleTransport {
    fn name(&self) -> &'static str {
        "single_transport"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        let expected = usize::from(state.manager.has_transport);
        if state.live_transports != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} transports live, manager tracks {expected}",
                    state.live_transports
                ),
            });
        }
        Ok(())
    }
}

/// A closed manager holds no resources and never reconnects.
pub struct ClosedIsQuiet;

impl Invariant for ClosedIsQuiet {
    fn name(&self) -> &'static str {
        "closed_is_quiet"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        let manager = &state.manager;
        if manager.state != ConnectionState::Closed {
            return Ok(());
        }

        if manager.has_transport || manager.has_pending_timer || manager.reconnect_enabled {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "closed with transport={} timer={} reconnect={}",
                    manager.has_transport, manager.has_pending_timer, manager.reconnect_enabled
                ),
            });
        }
        Ok(())
    }
}

/// History only grows.
pub struct HistoryAppendOnly;

impl Invariant for HistoryAppendOnly {
    fn name(&self) -> &'static str {
        "history_append_only"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        if state.published.messages.len() < state.previous_messages {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "history shrank from {} to {}",
                    state.previous_messages,
                    state.published.messages.len()
                ),
            });
        }
        Ok(())
    }
}

/// Frames are only written to open transports.
pub struct WritesOnlyWhenOpen;

impl Invariant for WritesOnlyWhenOpen {
    fn name(&self) -> &'static str {
        "writes_only_when_open"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        if state.writes_to_dead > 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} writes to transports that were not open", state.writes_to_dead),
            });
        }
        Ok(())
    }
}

/// Nothing is published after teardown.
pub struct SilentAfterTeardown;

impl Invariant for SilentAfterTeardown {
    fn name(&self) -> &'static str {
        "silent_after_teardown"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        if state.publishes_after_teardown > 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} outputs published after teardown", state.publishes_after_teardown),
            });
        }
        Ok(())
    }
}

/// The error is one of the known user-facing texts.
pub struct KnownErrorText;

impl Invariant for KnownErrorText {
    fn name(&self) -> &'static str {
        "known_error_text"
    }

    fn check(&self, state: &HarnessSnapshot) -> InvariantResult {
        const KNOWN: [&str; 4] =
            [ERROR_CONNECTION, ERROR_CONNECTION_LOST, ERROR_NOT_CONNECTED, ERROR_RETRIES_EXHAUSTED];

        match state.manager.error.as_deref() {
            Some(error) if !KNOWN.contains(&error) => Err(Violation {
                invariant: self.name(),
                message: format!("unexpected error text {error:?}"),
            }),
            _ => Ok(()),
        }
    }
}
