//! Parley wire protocol.
//!
//! Every frame exchanged with the chat server is one UTF-8 text message holding
//! one JSON object. The server pushes [`InboundMessage`]s; the client writes
//! [`OutgoingMessage`]s. Nothing here performs I/O - callers hand in the raw
//! frame text and get typed values back.
//!
//! # Invariants
//!
//! - Decoding is all-or-nothing: a frame either yields a complete
//!   [`InboundMessage`] or a [`ProtocolError`], never a partial value.
//! - Encoding an [`OutgoingMessage`] always produces an object tagged with
//!   `"type": "message"`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod message;
mod outgoing;

pub use errors::{ProtocolError, Result};
pub use message::{InboundMessage, MAX_FRAME_SIZE, MessageKind};
pub use outgoing::OutgoingMessage;
