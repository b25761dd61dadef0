//! Proptest strategies for manager operation sequences.

use std::time::Duration;

use parley_core::{ManagerConfig, ReconnectPolicy};
use parley_proto::{InboundMessage, MessageKind};
use proptest::prelude::*;

use crate::manager_harness::Operation;

/// Any message kind.
pub fn message_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Message),
        Just(MessageKind::System),
        Just(MessageKind::UserConnected),
        Just(MessageKind::UserDisconnected),
    ]
}

/// A well-formed server message.
pub fn inbound_message() -> impl Strategy<Value = InboundMessage> {
    (message_kind(), "[a-z]{1,8}", ".{0,32}", prop::option::of("[a-z]{1,8}")).prop_map(
        |(kind, username, content, channel)| InboundMessage {
            kind,
            user_id: format!("u-{username}"),
            username,
            content,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            channel,
        },
    )
}

/// Frame text that never decodes as a message.
pub fn malformed_frame() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("{".to_string()),
        Just("[]".to_string()),
        Just(r#"{"type":"typing","username":"x","user_id":"1","content":"","timestamp":"t"}"#.to_string()),
        Just(r#"{"type":"message","username":"x"}"#.to_string()),
        "[a-z ]{1,32}",
    ]
}

/// Time steps that straddle the default grace and retry delays.
pub fn time_step() -> impl Strategy<Value = Duration> {
    prop_oneof![
        (0u64..200).prop_map(Duration::from_millis),
        Just(Duration::from_millis(100)),
        Just(Duration::from_secs(3)),
        (0u64..10_000).prop_map(Duration::from_millis),
    ]
}

/// Any operation, weighted toward transport traffic.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        1 => Just(Operation::Start),
        4 => time_step().prop_map(Operation::Advance),
        3 => Just(Operation::CompleteOpen),
        1 => Just(Operation::FailOpen),
        1 => Just(Operation::StaleOpen),
        4 => inbound_message().prop_map(Operation::ServerMessage),
        1 => malformed_frame().prop_map(Operation::MalformedFrame),
        1 => Just(Operation::CloseClean),
        2 => Just(Operation::CloseUnclean),
        2 => ".{0,16}".prop_map(Operation::Send),
        1 => Just(Operation::Disconnect),
        1 => Just(Operation::Teardown),
    ]
}

/// Operation sequences that start the manager first.
pub fn session(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation(), 0..max_len).prop_map(|mut operations| {
        operations.insert(0, Operation::Start);
        operations
    })
}

/// Default timing or a small capped backoff.
pub fn manager_config() -> impl Strategy<Value = ManagerConfig> {
    prop_oneof![
        Just(ManagerConfig::default()),
        (1u64..5, prop::option::of(1u32..4)).prop_map(|(initial_secs, max_attempts)| {
            ManagerConfig {
                connect_grace: Duration::from_millis(100),
                reconnect: ReconnectPolicy::Backoff {
                    initial: Duration::from_secs(initial_secs),
                    max: Duration::from_secs(8),
                    multiplier: 2,
                    max_attempts,
                },
            }
        }),
    ]
}
