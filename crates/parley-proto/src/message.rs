//! Server-to-client messages.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Largest inbound frame accepted by [`InboundMessage::decode`] (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Kind of an inbound message.
///
/// The server distinguishes chat content from presence notices. The client
/// stores every kind in history; filtering is a presentation concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Chat message written by a user
    Message,
    /// Server notice
    System,
    /// A user joined the channel
    UserConnected,
    /// A user left the channel
    UserDisconnected,
}

impl MessageKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::System => "system",
            Self::UserConnected => "user_connected",
            Self::UserDisconnected => "user_disconnected",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message pushed by the server.
///
/// Decoded verbatim from one text frame. `timestamp` is the server's ISO-8601
/// string and is never reinterpreted, so history keeps receipt order rather
/// than timestamp order.
///
/// Unknown fields are ignored for forward compatibility. Unknown `type` values
/// and missing required fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message kind (`type` on the wire)
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Display name of the author
    pub username: String,
    /// Server-assigned author ID
    pub user_id: String,
    /// Message body
    pub content: String,
    /// ISO-8601 timestamp assigned by the server
    pub timestamp: String,
    /// Channel the message belongs to, when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl InboundMessage {
    /// Decode one frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLarge` if `text` exceeds [`MAX_FRAME_SIZE`]
    /// - `ProtocolError::Json` if `text` is not a well-formed message object
    pub fn decode(text: &str) -> Result<Self> {
        if text.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: text.len(), max: MAX_FRAME_SIZE });
        }

        Ok(serde_json::from_str(text)?)
    }

    /// Encode as frame text. Used by test servers and simulations.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_chat_message() {
        let text = r#"{"type":"message","username":"bob","user_id":"u2","content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#;
        let message = InboundMessage::decode(text).unwrap();

        assert_eq!(message.kind, MessageKind::Message);
        assert_eq!(message.username, "bob");
        assert_eq!(message.user_id, "u2");
        assert_eq!(message.content, "hi");
        assert_eq!(message.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(message.channel, None);
    }

    #[test]
    fn decode_presence_kinds() {
        for (wire, kind) in [
            ("system", MessageKind::System),
            ("user_connected", MessageKind::UserConnected),
            ("user_disconnected", MessageKind::UserDisconnected),
        ] {
            let text = format!(
                r#"{{"type":"{wire}","username":"server","user_id":"0","content":"x","timestamp":"t","channel":"general"}}"#
            );
            let message = InboundMessage::decode(&text).unwrap();
            assert_eq!(message.kind, kind);
            assert_eq!(message.channel.as_deref(), Some("general"));
            assert_eq!(kind.as_str(), wire);
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let text = r#"{"type":"system","username":"s","user_id":"0","content":"c","timestamp":"t","extra":42}"#;
        assert!(InboundMessage::decode(text).is_ok());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let text = r#"{"type":"typing","username":"s","user_id":"0","content":"c","timestamp":"t"}"#;
        assert!(matches!(InboundMessage::decode(text), Err(ProtocolError::Json { .. })));
    }

    #[test]
    fn missing_field_is_rejected() {
        let text = r#"{"type":"message","username":"bob","content":"hi","timestamp":"t"}"#;
        assert!(matches!(InboundMessage::decode(text), Err(ProtocolError::Json { .. })));
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(InboundMessage::decode("hello").is_err());
        assert!(InboundMessage::decode("").is_err());
        assert!(InboundMessage::decode("[1,2,3]").is_err());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let text = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            InboundMessage::decode(&text),
            Err(ProtocolError::FrameTooLarge { size, .. }) if size == MAX_FRAME_SIZE + 1
        ));
    }

    #[test]
    fn encode_omits_absent_channel() {
        let message = InboundMessage {
            kind: MessageKind::UserConnected,
            username: "alice".to_string(),
            user_id: "u1".to_string(),
            content: "alice joined".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            channel: None,
        };

        insta::assert_snapshot!(
            message.encode().unwrap(),
            @r#"{"type":"user_connected","username":"alice","user_id":"u1","content":"alice joined","timestamp":"2024-01-01T00:00:00Z"}"#
        );
    }
}
