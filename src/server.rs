//! Supervised messaging server.
//!
//! A [`MessagingServer`] composes a bind-mode [`FramedSocket`] (the data
//! path) with a [`ConnectionMonitor`] (the liveness path) and runs a serve
//! loop in a dedicated task: receive a request, dispatch it to the
//! application handler, send the reply, and track the heartbeat deadline.
//!
//! Cancellation is cooperative. The shared [`CancellationToken`] is created
//! by the embedding process (and may be shared across servers for
//! coordinated shutdown); both the serve loop and the monitor loop observe
//! it between bounded waits, so [`MessagingServer::shutdown`] completes
//! within one wait interval plus join overhead.
//!
//! Per-message failures never escape the loop. Timeouts are the normal
//! polling outcome, a failed send or handler invocation is counted and
//! logged, and one bad peer cannot take the server down. Only construction
//! errors surface to the embedder.

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    config::{EndpointConfig, HeartbeatAction},
    error::{EndpointError, RecvError},
    frame::Message,
    handler::MessageHandler,
    monitor::{ConnectionMonitor, LinkState, LinkTable},
    panic::format_panic,
    socket::FramedSocket,
    stats::{CounterSet, MessagingCounters, StatsSnapshot},
};

/// Heartbeat-aware request/reply server over one framed socket.
pub struct MessagingServer {
    config: EndpointConfig,
    shutdown: CancellationToken,
    counters: Arc<MessagingCounters>,
    links: Arc<LinkTable>,
    monitor: ConnectionMonitor,
    local: SocketAddr,
    socket: Option<FramedSocket>,
    task: Option<JoinHandle<()>>,
}

impl MessagingServer {
    /// Open a server endpoint described by `config`.
    ///
    /// The address is validated and the listener bound eagerly, so a bad
    /// address or occupied port fails here rather than at first use. The
    /// `shutdown` token is owned by the embedding process; cancelling it
    /// stops this server (and any others sharing the token).
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddress`] or
    /// [`EndpointError::BindFailed`] when the endpoint cannot be created.
    pub async fn open(
        config: EndpointConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, EndpointError> {
        let socket = FramedSocket::open(config.clone()).await?;
        let local = socket.local_addr();
        let counters = Arc::new(MessagingCounters::default());
        let links = Arc::new(LinkTable::default());
        let monitor = ConnectionMonitor::new(
            Arc::clone(&links),
            Arc::clone(&counters),
            config.monitor_poll(),
            &shutdown,
        );
        info!(%local, address = config.address(), "messaging server opened");
        Ok(Self {
            config,
            shutdown,
            counters,
            links,
            monitor,
            local,
            socket: Some(socket),
            task: None,
        })
    }

    /// Local address the endpoint is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.local }

    /// The counter aggregate, shared with the metrics exporter.
    ///
    /// The aggregate outlives the server if the exporter still holds it
    /// during shutdown; residual counters stay readable.
    #[must_use]
    pub fn counters(&self) -> Arc<MessagingCounters> { Arc::clone(&self.counters) }

    /// The per-peer link table.
    #[must_use]
    pub fn links(&self) -> Arc<LinkTable> { Arc::clone(&self.links) }

    /// Non-blocking copy of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot { self.counters.snapshot() }

    /// Attach the monitor and start the serve loop with `handler`.
    ///
    /// At most one serve loop runs per server instance.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::AlreadyRunning`] on a second start.
    pub fn start<H: MessageHandler>(&mut self, handler: H) -> Result<(), EndpointError> {
        let Some(mut socket) = self.socket.take() else {
            return Err(EndpointError::AlreadyRunning);
        };
        let events = socket.monitor().ok_or(EndpointError::AlreadyRunning)?;
        self.monitor.start(events)?;

        let span = info_span!(
            "serve",
            endpoint = self.config.name().unwrap_or(self.config.address()),
        );
        let ctx = LoopContext {
            counters: Arc::clone(&self.counters),
            links: Arc::clone(&self.links),
            shutdown: self.shutdown.clone(),
        };
        self.task = Some(tokio::spawn(serve_loop(socket, handler, ctx).instrument(span)));
        info!(local = %self.local, "serve loop started");
        Ok(())
    }

    /// Stop the server: cancel the shared token, join the serve loop, then
    /// join the monitor, in that order.
    ///
    /// Idempotent; a second call finds nothing left to join. No socket call
    /// is issued after the loop observes the cancelled token.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                warn!("serve loop ended abnormally");
            }
        }
        self.monitor.stop().await;
        // Never started: the socket is still here and must be released.
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        info!(local = %self.local, "messaging server stopped");
    }
}

struct LoopContext {
    counters: Arc<MessagingCounters>,
    links: Arc<LinkTable>,
    shutdown: CancellationToken,
}

async fn serve_loop<H: MessageHandler>(mut socket: FramedSocket, handler: H, ctx: LoopContext) {
    let config = socket.config().clone();
    // Cap each wait so heartbeat checks run at least once per interval.
    let wait = config.recv_timeout().min(config.heartbeat_interval());
    let mut last_activity = Instant::now();
    let mut active_peer = socket.peer_addr();
    let mut heartbeat_flagged = false;

    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }
        match socket.recv(wait).await {
            Ok(request) => {
                last_activity = Instant::now();
                heartbeat_flagged = false;
                ctx.counters
                    .base()
                    .record_received(request.payload_len() as u64);
                let reply = dispatch(&handler, request, &ctx.counters).await;
                if config.role().replies() {
                    match socket.send(&reply).await {
                        Ok(()) => {
                            ctx.counters.base().record_sent(reply.payload_len() as u64);
                        }
                        Err(error) => {
                            ctx.counters.base().record_send_error();
                            warn!(%error, "reply send failed");
                        }
                    }
                }
            }
            // The expected polling outcome; fall through to the checks below.
            Err(RecvError::Timeout) => {}
            Err(RecvError::Closed) => {
                if ctx.shutdown.is_cancelled() {
                    break;
                }
                ctx.counters.base().record_recv_error();
                error!("socket closed outside shutdown");
                break;
            }
            Err(RecvError::Io(error)) => {
                ctx.counters.base().record_recv_error();
                warn!(%error, "receive failed");
            }
        }

        // A peer change counts as activity: a fresh link starts a fresh
        // silence period.
        let peer_now = socket.peer_addr();
        if peer_now != active_peer {
            active_peer = peer_now;
            if peer_now.is_some() {
                last_activity = Instant::now();
                heartbeat_flagged = false;
            }
        }

        if !heartbeat_flagged && last_activity.elapsed() >= config.heartbeat_timeout() {
            heartbeat_flagged = true;
            ctx.counters.record_heartbeat_expired();
            if let Some(peer) = active_peer {
                ctx.links.transition(peer, LinkState::HeartbeatExpired);
                warn!(%peer, "heartbeat expired");
                if config.heartbeat_action() == HeartbeatAction::DropPeer {
                    socket.drop_peer();
                }
            } else {
                warn!("heartbeat expired with no active peer");
            }
        }
    }

    socket.close();
    debug!("serve loop exited");
}

async fn dispatch<H: MessageHandler>(
    handler: &H,
    request: Message,
    counters: &MessagingCounters,
) -> Message {
    match std::panic::AssertUnwindSafe(handler.handle(request))
        .catch_unwind()
        .await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(error)) => {
            counters.record_handler_failure();
            warn!(%error, "handler failed");
            Message::empty()
        }
        Err(payload) => {
            counters.record_handler_failure();
            error!(panic = %format_panic(payload), "handler panicked");
            Message::empty()
        }
    }
}
