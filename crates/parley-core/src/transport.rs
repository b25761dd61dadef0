//! Transport and timer identifiers, and close descriptions.
//!
//! Every transport the manager opens and every timer it starts gets a fresh
//! ID. Drivers echo the ID back with each event, which lets the manager
//! recognise callbacks from a transport or timer it has already abandoned.

/// Close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a connection ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Identifies one transport opened by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport#{}", self.0)
    }
}

/// Identifies one timer started by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// How a transport ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, if the peer sent one
    pub code: Option<u16>,
    /// Close reason, possibly empty
    pub reason: String,
    /// Closing handshake completed on both ends
    pub clean: bool,
}

impl CloseInfo {
    /// Closure after a completed closing handshake.
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self { code: Some(code), reason: reason.into(), clean: true }
    }

    /// Abrupt termination without a closing handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: Some(ABNORMAL_CLOSURE), reason: reason.into(), clean: false }
    }
}

impl std::fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.clean { "clean" } else { "unclean" };
        match self.code {
            Some(code) => write!(f, "{kind} close (code {code}): {}", self.reason),
            None => write!(f, "{kind} close: {}", self.reason),
        }
    }
}
