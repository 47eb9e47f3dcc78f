//! Server lifecycle: start, restart refusal, and cooperative shutdown.

mod common;

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use framelink::{
    EndpointError, LinkState, Message, MessagingServer, RecvError, handler_fn,
};

use common::{connect_client, start_echo_server, test_server_config};

/// Shutting down twice is harmless.
#[tokio::test]
async fn shutdown_is_idempotent() {
    common::init_tracing();
    let (mut server, _shutdown) = start_echo_server(test_server_config()).await;
    server.shutdown().await;
    server.shutdown().await;
}

/// A server only runs one serve loop; a second start is refused.
#[tokio::test]
async fn second_start_is_refused() {
    common::init_tracing();
    let shutdown = CancellationToken::new();
    let mut server = MessagingServer::open(test_server_config(), shutdown.clone())
        .await
        .unwrap();
    server
        .start(handler_fn(|request| async move { Ok(request) }))
        .unwrap();

    let refused = server.start(handler_fn(|request| async move { Ok(request) }));
    assert!(matches!(refused, Err(EndpointError::AlreadyRunning)));
    server.shutdown().await;
}

/// Shutdown returns within a small multiple of the receive poll window even
/// with a client connected.
#[tokio::test]
async fn shutdown_latency_is_bounded() {
    common::init_tracing();
    let (mut server, _shutdown) = start_echo_server(test_server_config()).await;
    let mut client = connect_client(server.local_addr()).await;
    client.send(&Message::single(b"ping")).await.unwrap();
    client.recv(Duration::from_secs(2)).await.unwrap();

    let started = Instant::now();
    server.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "shutdown took {:?}",
        started.elapsed()
    );
}

/// Socket events queued when the stop lands are still classified, so a
/// served link ends shutdown in the `Closed` terminal state.
#[tokio::test]
async fn shutdown_closes_tracked_links() {
    common::init_tracing();
    let (mut server, _shutdown) = start_echo_server(test_server_config()).await;
    let links = server.links();
    let mut client = connect_client(server.local_addr()).await;
    let client_addr = client.local_addr();
    client.send(&Message::single(b"ping")).await.unwrap();
    client.recv(Duration::from_secs(2)).await.unwrap();

    server.shutdown().await;
    assert_eq!(links.state(client_addr), Some(LinkState::Closed));
}

/// One cancellation token stops every server opened against it; connected
/// clients observe the close.
#[tokio::test]
async fn shared_token_stops_all_servers() {
    common::init_tracing();
    let shutdown = CancellationToken::new();
    let mut first = MessagingServer::open(test_server_config(), shutdown.clone())
        .await
        .unwrap();
    let mut second = MessagingServer::open(test_server_config(), shutdown.clone())
        .await
        .unwrap();
    first
        .start(handler_fn(|request| async move { Ok(request) }))
        .unwrap();
    second
        .start(handler_fn(|request| async move { Ok(request) }))
        .unwrap();

    let mut client_a = connect_client(first.local_addr()).await;
    let mut client_b = connect_client(second.local_addr()).await;
    client_a.send(&Message::single(b"a")).await.unwrap();
    client_a.recv(Duration::from_secs(2)).await.unwrap();
    client_b.send(&Message::single(b"b")).await.unwrap();
    client_b.recv(Duration::from_secs(2)).await.unwrap();

    shutdown.cancel();
    let closed_a = client_a.recv(Duration::from_secs(2)).await;
    let closed_b = client_b.recv(Duration::from_secs(2)).await;
    assert!(matches!(closed_a, Err(RecvError::Closed)));
    assert!(matches!(closed_b, Err(RecvError::Closed)));
    first.shutdown().await;
    second.shutdown().await;
}
