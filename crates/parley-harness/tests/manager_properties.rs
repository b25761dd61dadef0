//! Property-based tests for the connection manager.
//!
//! Every test drives [`ManagerHarness`] with generated operation sequences.
//! The standard invariants run after every operation, so each property below
//! also exercises the full invariant set.

use std::time::Duration;

use parley_core::{
    ConnectionState, ConnectionStatus, ERROR_NOT_CONNECTED, ManagerAction, ManagerConfig,
    TimerKind,
};
use parley_harness::{
    InvariantRegistry, ManagerHarness, Operation,
    strategies::{inbound_message, malformed_frame, manager_config, operation, session},
};
use proptest::prelude::*;

fn harness(config: ManagerConfig) -> ManagerHarness {
    ManagerHarness::new(config).with_invariants(InvariantRegistry::standard())
}

/// Start and open the first transport.
fn connected(config: ManagerConfig) -> ManagerHarness {
    let mut harness = harness(config);
    harness.run([
        Operation::Start,
        Operation::Advance(Duration::from_millis(100)),
        Operation::CompleteOpen,
    ]);
    assert_eq!(harness.manager().state(), ConnectionState::Connected);
    harness
}

fn is_publish(action: &ManagerAction) -> bool {
    matches!(
        action,
        ManagerAction::StatusChanged(_)
            | ManagerAction::ErrorChanged(_)
            | ManagerAction::MessageAppended(_)
    )
}

proptest! {
    #[test]
    fn prop_invariants_hold_for_any_session(
        config in manager_config(),
        operations in session(64),
    ) {
        let mut harness = harness(config);
        harness.run(operations);
    }

    #[test]
    fn prop_history_keeps_receipt_order(
        messages in prop::collection::vec(inbound_message(), 0..32),
        noise in prop::collection::vec(malformed_frame(), 0..8),
    ) {
        let mut harness = connected(ManagerConfig::default());

        // Interleave malformed frames; they must not disturb the order
        let mut noise = noise.into_iter();
        for message in &messages {
            harness.apply(Operation::ServerMessage(message.clone()));
            if let Some(frame) = noise.next() {
                harness.apply(Operation::MalformedFrame(frame));
            }
        }

        prop_assert_eq!(harness.manager().messages(), messages.as_slice());
        prop_assert_eq!(&harness.published().messages, &messages);
    }

    #[test]
    fn prop_malformed_frame_changes_nothing(
        prefix in session(24),
        frame in malformed_frame(),
    ) {
        let mut harness = harness(ManagerConfig::default());
        harness.run(prefix);

        let before = harness.manager().snapshot();
        let actions = harness.apply(Operation::MalformedFrame(frame));

        prop_assert!(actions.is_empty());
        prop_assert_eq!(harness.manager().snapshot(), before);
    }

    #[test]
    fn prop_send_never_touches_history(
        prefix in session(24),
        content in ".{0,64}",
    ) {
        let mut harness = harness(ManagerConfig::default());
        harness.run(prefix);

        let before = harness.manager().messages().len();
        let actions = harness.apply(Operation::Send(content));

        prop_assert_eq!(harness.manager().messages().len(), before);
        prop_assert!(!actions.iter().any(|a| matches!(a, ManagerAction::MessageAppended(_))));
    }

    #[test]
    fn prop_send_without_open_transport_only_sets_error(
        prefix in session(12),
        content in ".{0,64}",
    ) {
        let mut harness = harness(ManagerConfig::default());
        harness.run(prefix);
        prop_assume!(harness.manager().is_active());
        prop_assume!(harness.manager().state() != ConnectionState::Connected);

        let writes_before = harness.writes().len();
        harness.apply(Operation::Send(content));

        prop_assert_eq!(harness.writes().len(), writes_before);
        prop_assert_eq!(harness.manager().error(), Some(ERROR_NOT_CONNECTED));
    }

    #[test]
    fn prop_nothing_published_after_teardown(
        prefix in session(24),
        suffix in prop::collection::vec(operation(), 0..32),
    ) {
        let mut harness = harness(ManagerConfig::default());
        harness.run(prefix);
        harness.apply(Operation::Teardown);

        let status = harness.published().status;
        let error = harness.published().error.clone();
        for operation in suffix {
            let actions = harness.apply(operation);
            prop_assert!(!actions.iter().any(is_publish), "published {:?}", actions);
            prop_assert!(!actions.iter().any(|a| matches!(
                a,
                ManagerAction::OpenTransport { .. }
                    | ManagerAction::SendText { .. }
                    | ManagerAction::StartTimer { .. }
            )), "unexpected action after teardown: {:?}", actions);
        }

        prop_assert_eq!(harness.published().status, status);
        prop_assert_eq!(&harness.published().error, &error);
    }

    #[test]
    fn prop_disconnect_silences_transport_events(
        prefix in session(12),
        suffix in prop::collection::vec(
            prop_oneof![
                Just(Operation::CompleteOpen),
                Just(Operation::FailOpen),
                Just(Operation::StaleOpen),
                Just(Operation::CloseClean),
                Just(Operation::CloseUnclean),
                inbound_message().prop_map(Operation::ServerMessage),
                (0u64..10_000).prop_map(|ms| Operation::Advance(Duration::from_millis(ms))),
            ],
            0..32,
        ),
    ) {
        let mut harness = harness(ManagerConfig::default());
        harness.run(prefix);
        prop_assume!(harness.manager().is_active());
        harness.apply(Operation::Disconnect);

        prop_assert_eq!(harness.published().status, ConnectionStatus::Disconnected);
        prop_assert_eq!(harness.published().error.as_deref(), None);

        for operation in suffix {
            let actions = harness.apply(operation);
            prop_assert!(!actions.iter().any(is_publish), "published {:?}", actions);
        }
        prop_assert_eq!(harness.manager().state(), ConnectionState::Closed);
    }

    #[test]
    fn prop_unclean_close_schedules_exactly_one_retry(
        messages in prop::collection::vec(inbound_message(), 0..8),
    ) {
        let mut harness = connected(ManagerConfig::default());
        for message in messages {
            harness.apply(Operation::ServerMessage(message));
        }

        let actions = harness.apply(Operation::CloseUnclean);
        let retries: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, ManagerAction::StartTimer { kind: TimerKind::Reconnect, .. }))
            .collect();

        prop_assert_eq!(retries.len(), 1);
        let retry_at = harness.now() + Duration::from_secs(3);
        prop_assert_eq!(harness.armed_timers(), vec![(TimerKind::Reconnect, retry_at)]);
    }

    #[test]
    fn prop_clean_close_schedules_nothing(
        messages in prop::collection::vec(inbound_message(), 0..8),
        wait in 0u64..60_000,
    ) {
        let mut harness = connected(ManagerConfig::default());
        for message in messages {
            harness.apply(Operation::ServerMessage(message));
        }

        let actions = harness.apply(Operation::CloseClean);
        prop_assert!(!actions.iter().any(|a| matches!(a, ManagerAction::StartTimer { .. })), "started timer {:?}", actions);

        let opened = harness.opened_urls().len();
        harness.apply(Operation::Advance(Duration::from_millis(wait)));
        prop_assert_eq!(harness.opened_urls().len(), opened);
        prop_assert_eq!(harness.manager().state(), ConnectionState::Disconnected);
    }

    #[test]
    fn prop_backoff_attempts_are_capped(
        max_attempts in 1u32..5,
    ) {
        let config = ManagerConfig {
            connect_grace: Duration::from_millis(100),
            reconnect: parley_core::ReconnectPolicy::Backoff {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(8),
                multiplier: 2,
                max_attempts: Some(max_attempts),
            },
        };
        let mut harness = harness(config);
        harness.run([Operation::Start, Operation::Advance(Duration::from_millis(100))]);

        // Every attempt fails; wait well past any delay in between
        for _ in 0..10 {
            harness.apply(Operation::FailOpen);
            harness.apply(Operation::Advance(Duration::from_secs(60)));
        }

        prop_assert_eq!(harness.opened_urls().len(), max_attempts as usize + 1);
        prop_assert!(harness.armed_timers().is_empty());
    }
}

#[test]
fn teardown_inside_grace_window_opens_nothing() {
    let mut harness = harness(ManagerConfig::default());
    harness.run([
        Operation::Start,
        Operation::Advance(Duration::from_millis(50)),
        Operation::Teardown,
        Operation::Advance(Duration::from_secs(10)),
    ]);

    assert!(harness.opened_urls().is_empty());
    assert!(harness.armed_timers().is_empty());
}

#[test]
fn identity_is_percent_encoded() {
    let params =
        parley_core::ConnectionParameters::new("a&b=c", "dev ops#1", "ws://localhost:8080/ws")
            .unwrap();
    let mut harness = ManagerHarness::with_params(params, ManagerConfig::default());
    harness.run([Operation::Start, Operation::Advance(Duration::from_millis(100))]);

    let url = &harness.opened_urls()[0];
    assert_eq!(url.query(), Some("username=a%26b%3Dc&channel=dev+ops%231"));
}
