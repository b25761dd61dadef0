//! Client-to-server messages.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A message written by the local user.
///
/// Serialized as `{"type":"message","content":...}`. Outgoing messages never
/// enter the local history directly; the server's echo arrives as an
/// [`crate::InboundMessage`] like any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Chat message for the connected channel
    Message {
        /// Message body
        content: String,
    },
}

impl OutgoingMessage {
    /// Chat message with the given body.
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message { content: content.into() }
    }

    /// Message body.
    pub fn content(&self) -> &str {
        match self {
            Self::Message { content } => content,
        }
    }

    /// Encode as frame text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode frame text. Used by test servers and simulations.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_tagged_object() {
        let encoded = OutgoingMessage::message("hi there").encode().unwrap();
        insta::assert_snapshot!(encoded, @r#"{"type":"message","content":"hi there"}"#);
    }

    #[test]
    fn escapes_content() {
        let encoded = OutgoingMessage::message("say \"hi\"\n").encode().unwrap();
        insta::assert_snapshot!(encoded, @r#"{"type":"message","content":"say \"hi\"\n"}"#);
    }

    #[test]
    fn decode_rejects_other_types() {
        assert!(OutgoingMessage::decode(r#"{"type":"system","content":"x"}"#).is_err());
    }
}
