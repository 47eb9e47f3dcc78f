//! Heartbeat expiry observed end to end through a live server.

mod common;

use std::time::Duration;

use framelink::{EndpointConfig, HeartbeatAction, LinkState, Message, RecvError};

use common::{connect_client, eventually, start_echo_server};

fn heartbeat_config(action: HeartbeatAction) -> EndpointConfig {
    EndpointConfig::reply_server("127.0.0.1:0")
        .with_recv_timeout(Duration::from_millis(25))
        .with_send_timeout(Duration::from_millis(500))
        .with_heartbeat_interval(Duration::from_millis(25))
        .with_heartbeat_timeout(Duration::from_millis(150))
        .with_heartbeat_action(action)
        .with_monitor_poll(Duration::from_millis(20))
}

/// A silent peer is flagged exactly once per silent period, and the server
/// keeps serving it afterwards.
#[tokio::test]
async fn silent_peer_flagged_once_and_still_served() {
    common::init_tracing();
    let (mut server, _shutdown) =
        start_echo_server(heartbeat_config(HeartbeatAction::Observe)).await;
    let links = server.links();

    let mut client = connect_client(server.local_addr()).await;
    let client_addr = client.local_addr();
    client.send(&Message::single(b"ping")).await.unwrap();
    let reply = client.recv(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reply.frames()[0].as_ref(), b"ping");

    // Go silent past the heartbeat timeout.
    eventually(
        || links.state(client_addr) == Some(LinkState::HeartbeatExpired),
        "link flagged as expired",
    )
    .await;
    assert_eq!(server.snapshot().heartbeat_expirations, 1);

    // Staying silent does not flag the same period again.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.snapshot().heartbeat_expirations, 1);

    // The link survived; traffic resumes normally.
    client.send(&Message::single(b"again")).await.unwrap();
    let reply = client.recv(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reply.frames()[0].as_ref(), b"again");
    server.shutdown().await;
}

/// With the drop action, expiry severs the peer and a reconnecting client is
/// served again.
#[tokio::test]
async fn drop_action_severs_expired_peer() {
    common::init_tracing();
    let (mut server, _shutdown) =
        start_echo_server(heartbeat_config(HeartbeatAction::DropPeer)).await;
    let links = server.links();

    let mut client = connect_client(server.local_addr()).await;
    let client_addr = client.local_addr();
    client.send(&Message::single(b"ping")).await.unwrap();
    client.recv(Duration::from_secs(2)).await.unwrap();

    // Silence past the timeout forces the server to cut the link.
    eventually(
        || server.snapshot().heartbeat_expirations == 1,
        "expiry counted",
    )
    .await;
    let severed = client.recv(Duration::from_secs(2)).await;
    assert!(matches!(severed, Err(RecvError::Closed)));
    eventually(
        || links.history(client_addr).contains(&LinkState::HeartbeatExpired),
        "expiry recorded in link history",
    )
    .await;

    // A fresh connection is accepted and served.
    let mut replacement = connect_client(server.local_addr()).await;
    replacement.send(&Message::single(b"back")).await.unwrap();
    let reply = replacement.recv(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reply.frames()[0].as_ref(), b"back");
    server.shutdown().await;
}

/// Expiry is counted even before any peer has connected.
#[tokio::test]
async fn expiry_counted_without_a_peer() {
    common::init_tracing();
    let (mut server, _shutdown) =
        start_echo_server(heartbeat_config(HeartbeatAction::Observe)).await;

    eventually(
        || server.snapshot().heartbeat_expirations == 1,
        "idle endpoint flagged",
    )
    .await;
    assert!(server.links().is_empty());
    server.shutdown().await;
}
