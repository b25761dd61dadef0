//! Simulation environment on tokio's virtual clock.
//!
//! With the clock paused (`#[tokio::test(start_paused = true)]`), time only
//! moves when every task is idle, jumping straight to the next timer. Grace
//! and reconnect delays then elapse instantly and in a reproducible order.

use std::time::Duration;

use parley_core::env::Environment;

/// Environment backed by `tokio::time`.
///
/// Behaves like real time unless the tokio clock is paused.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl SimEnv {
    /// Create a new simulation environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
