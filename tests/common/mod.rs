//! Shared helpers for framelink integration tests.
//!
//! Each integration test binary compiles this module separately and uses a
//! subset of the helpers.
#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use framelink::{EndpointConfig, FramedSocket, MessagingServer, handler::handler_fn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Server config on an ephemeral loopback port with test-friendly timings.
pub fn test_server_config() -> EndpointConfig {
    EndpointConfig::reply_server("127.0.0.1:0")
        .with_recv_timeout(Duration::from_millis(50))
        .with_send_timeout(Duration::from_millis(500))
        .with_heartbeat_interval(Duration::from_millis(50))
        .with_heartbeat_timeout(Duration::from_secs(60))
        .with_monitor_poll(Duration::from_millis(20))
}

/// Open a server from `config` and start it with an echo handler.
pub async fn start_echo_server(config: EndpointConfig) -> (MessagingServer, CancellationToken) {
    let shutdown = CancellationToken::new();
    let mut server = MessagingServer::open(config, shutdown.clone())
        .await
        .expect("open server");
    server
        .start(handler_fn(|request| async move { Ok(request) }))
        .expect("start server");
    (server, shutdown)
}

/// Connect a request client to `addr`.
pub async fn connect_client(addr: SocketAddr) -> FramedSocket {
    let config = EndpointConfig::request_client(addr.to_string())
        .with_send_timeout(Duration::from_millis(500));
    FramedSocket::open(config).await.expect("connect client")
}

/// Poll `cond` every 10 ms until it holds, or panic after two seconds.
pub async fn eventually<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time: {what}");
}
