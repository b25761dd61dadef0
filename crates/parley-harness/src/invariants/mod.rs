//! Invariant checking for manager simulations.
//!
//! Invariants are properties that must always hold during execution. Unlike
//! example-based tests that check specific scenarios, they verify behavioral
//! properties across every generated operation sequence.
//!
//! The [`crate::ManagerHarness`] captures a [`HarnessSnapshot`] after each
//! operation and runs the registered [`Invariant`]s against it. Violations
//! panic with the operation that caused them.

mod checks;
mod snapshot;

pub use checks::{
    ClosedIsQuiet, HistoryAppendOnly, KnownErrorText, PublishedMatchesManager, SilentAfterTeardown,
    SingleTimer, SingleTransport, StatusFollowsState, WritesOnlyWhenOpen,
};
pub use snapshot::HarnessSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against harness state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &HarnessSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every standard invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(StatusFollowsState);
        registry.add(PublishedMatchesManager);
        registry.add(SingleTimer);
        registry.add(SingleTransport);
        registry.add(ClosedIsQuiet);
        registry.add(HistoryAppendOnly);
        registry.add(WritesOnlyWhenOpen);
        registry.add(SilentAfterTeardown);
        registry.add(KnownErrorText);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &HarnessSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &HarnessSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
