//! Deterministic simulation harness for Parley connection testing.
//!
//! Two ways to drive the connection manager without a network:
//!
//! - [`ManagerHarness`]: synchronous, on virtual `Duration` time. Executes
//!   manager actions into plain bookkeeping and checks invariants after
//!   every [`Operation`]. Used by property tests.
//! - [`SimConnector`] + [`SimEnv`]: in-memory transports and tokio's pausable
//!   clock, so the real [`parley_client::ChatClient`] runtime runs end to end
//!   in tests.
//!
//! # Invariant Testing
//!
//! The `invariants` module verifies WHAT must be true across all execution
//! paths, not specific scenarios. Use [`InvariantRegistry::standard()`] for
//! the full set.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod manager_harness;
pub mod sim_connector;
pub mod sim_env;
pub mod strategies;

pub use invariants::{HarnessSnapshot, Invariant, InvariantRegistry, InvariantResult, Violation};
pub use manager_harness::{ManagerHarness, Operation, Published, chat_message};
pub use sim_connector::{SimConnector, SimListener, SimPeer};
pub use sim_env::SimEnv;
