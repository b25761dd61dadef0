//! End-to-end runtime scenarios on tokio's paused clock.
//!
//! These run the real [`ChatClient`] runtime against [`SimConnector`] peers.
//! They cover what the synchronous harness cannot:
//! - timer tasks and connect tasks are cancelled on disconnect and teardown
//! - watch channels publish what the manager decided
//! - retarget replaces the session without losing subscribers

use std::time::Duration;

use parley_client::{
    ChatClient, ConnectionParameters, ConnectionStatus, Environment, ManagerConfig, Outbound,
};
use parley_core::{ERROR_CONNECTION, ERROR_CONNECTION_LOST, ERROR_NOT_CONNECTED};
use parley_harness::{SimConnector, SimEnv, SimListener, chat_message};

type TestClient = ChatClient<SimConnector, SimEnv>;

fn params(username: &str, channel: &str) -> ConnectionParameters {
    ConnectionParameters::new(username, channel, "ws://localhost:8080/ws").unwrap()
}

fn spawn(username: &str, channel: &str) -> (TestClient, SimConnector, SimListener) {
    let (connector, listener) = SimConnector::new();
    let client = ChatClient::spawn(
        params(username, channel),
        ManagerConfig::default(),
        connector.clone(),
        SimEnv::new(),
    );
    (client, connector, listener)
}

async fn wait_status(client: &TestClient, status: ConnectionStatus) {
    client.watch_status().wait_for(|s| *s == status).await.unwrap();
}

async fn wait_error(client: &TestClient, error: Option<&str>) {
    client.watch_error().wait_for(|e| e.as_deref() == error).await.unwrap();
}

async fn sleep(duration: Duration) {
    SimEnv::new().sleep(duration).await;
}

#[tokio::test(start_paused = true)]
async fn alice_joins_general_and_sees_bob() {
    let (client, _connector, mut listener) = spawn("alice", "general");
    let started = tokio::time::Instant::now();

    let peer = listener.accept().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(peer.query("username").as_deref(), Some("alice"));
    assert_eq!(peer.query("channel").as_deref(), Some("general"));

    wait_status(&client, ConnectionStatus::Connected).await;
    peer.push(&chat_message("bob", "hi"));

    client.watch_messages().wait_for(|m| m.len() == 1).await.unwrap();
    let messages = client.messages();
    assert_eq!(messages[0].username, "bob");
    assert_eq!(messages[0].content, "hi");
    assert_eq!(client.error(), None);
}

#[tokio::test(start_paused = true)]
async fn send_message_writes_frame() {
    let (client, _connector, mut listener) = spawn("alice", "general");
    let mut peer = listener.accept().await.unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    client.send_message("hello");

    assert_eq!(
        peer.recv().await,
        Some(Outbound::Text(r#"{"type":"message","content":"hello"}"#.to_string()))
    );
    assert!(client.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_connection_reconnects_after_delay() {
    let (client, connector, mut listener) = spawn("alice", "general");
    let peer = listener.accept().await.unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    peer.push(&chat_message("bob", "before"));
    client.watch_messages().wait_for(|m| m.len() == 1).await.unwrap();

    let lost_at = tokio::time::Instant::now();
    peer.drop_connection();

    wait_status(&client, ConnectionStatus::Disconnected).await;
    assert_eq!(client.error().as_deref(), Some(ERROR_CONNECTION_LOST));

    let peer = listener.accept().await.unwrap();
    assert!(lost_at.elapsed() >= Duration::from_secs(3));

    wait_status(&client, ConnectionStatus::Connected).await;
    assert_eq!(client.error(), None);
    assert_eq!(connector.attempt_count(), 2);

    // History survives reconnects
    peer.push(&chat_message("bob", "after"));
    client.watch_messages().wait_for(|m| m.len() == 2).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn server_goodbye_is_not_retried() {
    let (client, connector, mut listener) = spawn("alice", "general");
    let peer = listener.accept().await.unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    peer.close_clean(1000, "server restart");
    wait_status(&client, ConnectionStatus::Disconnected).await;

    sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(client.error(), None);
}

#[tokio::test(start_paused = true)]
async fn refused_connects_are_retried() {
    let (connector, mut listener) = SimConnector::new();
    connector.refuse_next(2);
    let client = ChatClient::spawn(
        params("alice", "general"),
        ManagerConfig::default(),
        connector.clone(),
        SimEnv::new(),
    );

    wait_error(&client, Some(ERROR_CONNECTION)).await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    let _peer = listener.accept().await.unwrap();
    assert_eq!(connector.attempt_count(), 3);

    wait_status(&client, ConnectionStatus::Connected).await;
    assert_eq!(client.error(), None);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_connecting_abandons_attempt() {
    let (connector, mut listener) = SimConnector::new();
    connector.set_connect_delay(Duration::from_secs(1));
    let client = ChatClient::spawn(
        params("alice", "general"),
        ManagerConfig::default(),
        connector.clone(),
        SimEnv::new(),
    );

    sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connecting);

    client.disconnect();
    wait_status(&client, ConnectionStatus::Disconnected).await;

    sleep(Duration::from_secs(10)).await;
    assert!(listener.try_accept().is_none());
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(client.error(), None);

    client.send_message("anyone?");
    wait_error(&client, Some(ERROR_NOT_CONNECTED)).await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn dropping_client_inside_grace_window_never_connects() {
    let (first, first_connector, _first_listener) = spawn("alice", "general");
    let (second, second_connector, mut second_listener) = spawn("alice", "general");

    sleep(Duration::from_millis(50)).await;
    drop(first);

    let _peer = second_listener.accept().await.unwrap();
    wait_status(&second, ConnectionStatus::Connected).await;

    sleep(Duration::from_secs(5)).await;
    assert_eq!(first_connector.attempt_count(), 0);
    assert_eq!(second_connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_transport_silently() {
    let (client, _connector, mut listener) = spawn("alice", "general");
    let mut peer = listener.accept().await.unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    let status = client.watch_status();

    client.shutdown().await;

    assert_eq!(
        peer.recv().await,
        Some(Outbound::Close { code: 1000, reason: "client shut down".to_string() })
    );
    assert_eq!(*status.borrow(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn retarget_starts_fresh_session() {
    let (mut client, connector, mut listener) = spawn("alice", "general");
    let mut old_peer = listener.accept().await.unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    old_peer.push(&chat_message("bob", "hi"));
    client.watch_messages().wait_for(|m| m.len() == 1).await.unwrap();
    let mut status = client.watch_status();

    // Same parameters are a no-op
    client.retarget(params("alice", "general")).await;
    assert_eq!(client.messages().len(), 1);
    assert_eq!(connector.attempt_count(), 1);

    client.retarget(params("alice", "random")).await;
    assert!(client.messages().is_empty());
    assert_eq!(client.status(), ConnectionStatus::Connecting);
    assert_eq!(
        old_peer.recv().await,
        Some(Outbound::Close { code: 1000, reason: "client shut down".to_string() })
    );

    let new_peer = listener.accept().await.unwrap();
    assert_eq!(new_peer.query("channel").as_deref(), Some("random"));

    // Subscribers from before the switch keep receiving updates
    status.wait_for(|s| *s == ConnectionStatus::Connected).await.unwrap();
    assert_eq!(client.params().channel(), "random");
}
