//! State captured for invariant checks.

use parley_core::ManagerSnapshot;

use crate::manager_harness::Published;

/// Manager internals plus what the harness observed around them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSnapshot {
    /// Manager internals
    pub manager: ManagerSnapshot,
    /// Outputs as published so far
    pub published: Published,
    /// Published history length before the last operation
    pub previous_messages: usize,
    /// Timers the harness has armed and not yet fired or cancelled
    pub armed_timers: usize,
    /// Transports opening or open on the harness side
    pub live_transports: usize,
    /// Writes issued for transports that were not open
    pub writes_to_dead: usize,
    /// Outputs published after teardown
    pub publishes_after_teardown: usize,
}
