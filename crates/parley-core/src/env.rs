//! Time source for drivers.
//!
//! The [`crate::ConnectionManager`] never reads a clock. Whoever drives it
//! reads [`Environment::now`] before each call and turns timer actions into
//! [`Environment::sleep`] calls. Production passes wall-clock time; tests pass
//! tokio's paused clock so a 3 second reconnect delay costs nothing.

use std::{future::Future, ops::Sub, time::Duration};

/// Clock and timer used by a driver.
///
/// # Invariants
///
/// - `now()` is monotonic
/// - a `sleep(d)` started at `t` completes no earlier than `t + d`
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time. `std::time::Instant` in production, the virtual
    /// `tokio::time::Instant` in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Wait for `duration` on this environment's clock.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
