//! Framed socket over TCP.
//!
//! A [`FramedSocket`] owns one messaging endpoint in bind or connect mode and
//! exchanges whole multipart messages with bounded per-call timeouts. The
//! socket is deliberately not `Clone`: the task that opened it owns it for
//! its lifetime, and teardown happens only after that task has stopped
//! issuing calls.
//!
//! Bind-mode sockets serve one peer at a time, matching the strict
//! request/reply discipline of [`crate::config::SocketRole::Reply`]. A peer
//! disconnect observed mid-receive clears the active peer and keeps waiting
//! for the next one within the same deadline, so the serve loop only ever
//! sees a message or a timeout.
//!
//! Lifecycle notifications are pushed to a companion event channel; the
//! receiving half is handed out once via [`FramedSocket::monitor`] and is
//! consumed by the connection monitor.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time,
};
use tracing::{debug, warn};

use crate::{
    config::{EndpointConfig, SocketMode},
    error::{EndpointError, RecvError, SendError},
    frame::{Message, MultipartCodec},
};

/// Low-level lifecycle notification emitted by a [`FramedSocket`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A bind-mode socket started listening on its local address.
    Listening(SocketAddr),
    /// An incoming peer was accepted and is being admitted.
    Accepted(SocketAddr),
    /// A connect-mode socket started dialing the remote address.
    Dialing(SocketAddr),
    /// A peer link became fully established.
    Connected(SocketAddr),
    /// A peer link went away.
    Disconnected(SocketAddr),
    /// Peer admission failed (for example, an allowlist rejection).
    HandshakeFailed(SocketAddr),
    /// The socket itself was closed.
    Closed,
}

/// Receiving half of a socket's event channel.
///
/// Handed out exactly once per socket; the connection monitor owns it for the
/// lifetime of its observation loop.
pub struct SocketEvents {
    rx: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketEvents {
    /// Receive the next event, or `None` once the socket is gone.
    pub async fn next(&mut self) -> Option<SocketEvent> { self.rx.recv().await }

    /// Take an already-queued event without waiting.
    pub(crate) fn try_next(&mut self) -> Option<SocketEvent> { self.rx.try_recv().ok() }
}

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    buf: BytesMut,
}

impl Peer {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            buf: BytesMut::with_capacity(4096),
        }
    }
}

enum Inner {
    Bound {
        listener: TcpListener,
        peer: Option<Peer>,
    },
    Dialed {
        peer: Option<Peer>,
    },
}

/// One messaging endpoint exchanging multipart messages over TCP.
pub struct FramedSocket {
    config: EndpointConfig,
    codec: MultipartCodec,
    inner: Inner,
    local: SocketAddr,
    events: mpsc::UnboundedSender<SocketEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SocketEvent>>,
    closed: bool,
}

impl FramedSocket {
    /// Open the endpoint described by `config`.
    ///
    /// Bind mode claims the address immediately; connect mode dials it. Both
    /// validate the address eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddress`] for an unparseable address,
    /// [`EndpointError::BindFailed`] or [`EndpointError::ConnectFailed`] when
    /// the transport resource cannot be created.
    pub async fn open(config: EndpointConfig) -> Result<Self, EndpointError> {
        let addr = config.socket_addr()?;
        let (events, rx) = mpsc::unbounded_channel();
        let codec = MultipartCodec::new(config.max_message_len());

        let (inner, local) = match config.mode() {
            SocketMode::Bind => {
                let listener =
                    TcpListener::bind(addr)
                        .await
                        .map_err(|source| EndpointError::BindFailed {
                            address: config.address().to_owned(),
                            source,
                        })?;
                let local = listener.local_addr()?;
                let _ = events.send(SocketEvent::Listening(local));
                debug!(%local, "socket listening");
                (
                    Inner::Bound {
                        listener,
                        peer: None,
                    },
                    local,
                )
            }
            SocketMode::Connect => {
                let _ = events.send(SocketEvent::Dialing(addr));
                let stream = match TcpStream::connect(addr).await {
                    Ok(stream) => stream,
                    Err(source) => {
                        let _ = events.send(SocketEvent::HandshakeFailed(addr));
                        return Err(EndpointError::ConnectFailed {
                            address: config.address().to_owned(),
                            source,
                        });
                    }
                };
                let _ = stream.set_nodelay(true);
                let local = stream.local_addr()?;
                let _ = events.send(SocketEvent::Connected(addr));
                debug!(%local, peer = %addr, "socket connected");
                (
                    Inner::Dialed {
                        peer: Some(Peer::new(stream, addr)),
                    },
                    local,
                )
            }
        };

        Ok(Self {
            config,
            codec,
            inner,
            local,
            events,
            events_rx: Some(rx),
            closed: false,
        })
    }

    /// Take the event channel for monitoring. Returns `None` after the first
    /// call.
    pub fn monitor(&mut self) -> Option<SocketEvents> {
        self.events_rx.take().map(|rx| SocketEvents { rx })
    }

    /// Local address the socket is bound or connected from.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.local }

    /// Remote address of the active peer, if one is linked.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            Inner::Bound { peer, .. } | Inner::Dialed { peer } => peer.as_ref().map(|p| p.addr),
        }
    }

    /// The configuration the socket was opened from.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig { &self.config }

    /// Receive the next whole message, waiting up to `timeout`.
    ///
    /// In bind mode this also performs peer admission: pending connections
    /// are accepted (and allowlist-checked) within the same deadline.
    ///
    /// # Errors
    ///
    /// [`RecvError::Timeout`] when no message arrived in time; the expected
    /// polling outcome, letting callers observe a shutdown flag between
    /// waits. [`RecvError::Closed`] when the socket (or, in connect mode, the
    /// peer link) is gone. [`RecvError::Io`] for transport failures.
    pub async fn recv(&mut self, timeout: std::time::Duration) -> Result<Message, RecvError> {
        if self.closed {
            return Err(RecvError::Closed);
        }
        match time::timeout(timeout, self.recv_inner()).await {
            Ok(result) => result,
            Err(_) => Err(RecvError::Timeout),
        }
    }

    async fn recv_inner(&mut self) -> Result<Message, RecvError> {
        loop {
            match &mut self.inner {
                Inner::Bound { listener, peer } => {
                    if peer.is_none() {
                        *peer =
                            Some(accept_peer(listener, &self.events, &self.config).await?);
                    }
                    let Some(active) = peer.as_mut() else {
                        continue;
                    };
                    match read_message(&self.codec, active).await {
                        Ok(Some(message)) => return Ok(message),
                        Ok(None) => {
                            // Peer hung up; keep waiting for the next one
                            // within the caller's deadline.
                            let addr = active.addr;
                            *peer = None;
                            let _ = self.events.send(SocketEvent::Disconnected(addr));
                            debug!(peer = %addr, "peer disconnected");
                        }
                        Err(error) => {
                            let addr = active.addr;
                            *peer = None;
                            let _ = self.events.send(SocketEvent::Disconnected(addr));
                            return Err(error);
                        }
                    }
                }
                Inner::Dialed { peer } => {
                    let Some(active) = peer.as_mut() else {
                        return Err(RecvError::Closed);
                    };
                    match read_message(&self.codec, active).await {
                        Ok(Some(message)) => return Ok(message),
                        Ok(None) => {
                            let addr = active.addr;
                            *peer = None;
                            let _ = self.events.send(SocketEvent::Disconnected(addr));
                            return Err(RecvError::Closed);
                        }
                        Err(error) => {
                            let addr = active.addr;
                            *peer = None;
                            let _ = self.events.send(SocketEvent::Disconnected(addr));
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Send one whole multipart message to the active peer.
    ///
    /// The message is encoded up front and written with a single bounded
    /// write, so a peer never observes a partial message: either the whole
    /// message is queued or the call fails.
    ///
    /// # Errors
    ///
    /// [`SendError::Closed`] when no peer is linked or the socket was closed,
    /// [`SendError::Timeout`] when the write did not complete within the send
    /// timeout, [`SendError::Io`] for transport failures. Both failure paths
    /// sever the peer link: a partially written message poisons the stream
    /// for every message after it.
    pub async fn send(&mut self, message: &Message) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::Closed);
        }
        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf).map_err(SendError::Io)?;

        let (peer_slot, events) = match &mut self.inner {
            Inner::Bound { peer, .. } | Inner::Dialed { peer } => (peer, &self.events),
        };
        let Some(peer) = peer_slot.as_mut() else {
            return Err(SendError::Closed);
        };

        let write = async {
            peer.stream.write_all(&buf).await?;
            peer.stream.flush().await
        };
        match time::timeout(self.config.send_timeout(), write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                let addr = peer.addr;
                *peer_slot = None;
                let _ = events.send(SocketEvent::Disconnected(addr));
                Err(SendError::Io(error))
            }
            Err(_) => {
                // The write was cancelled mid-message; the stream now holds a
                // torn frame and can never carry a whole message again.
                let addr = peer.addr;
                *peer_slot = None;
                let _ = events.send(SocketEvent::Disconnected(addr));
                Err(SendError::Timeout)
            }
        }
    }

    /// Sever the active peer link, if any.
    ///
    /// The peer observes an ordinary connection close and may reconnect.
    pub fn drop_peer(&mut self) {
        let peer_slot = match &mut self.inner {
            Inner::Bound { peer, .. } | Inner::Dialed { peer } => peer,
        };
        if let Some(peer) = peer_slot.take() {
            warn!(peer = %peer.addr, "dropping peer link");
            let _ = self.events.send(SocketEvent::Disconnected(peer.addr));
        }
    }

    /// Close the socket. Further calls fail with `Closed`.
    ///
    /// Callers must stop issuing `recv`/`send` before closing; the serve loop
    /// guarantees this by closing only after it has exited.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let peer_slot = match &mut self.inner {
            Inner::Bound { peer, .. } | Inner::Dialed { peer } => peer,
        };
        peer_slot.take();
        let _ = self.events.send(SocketEvent::Closed);
        debug!(local = %self.local, "socket closed");
    }
}

async fn accept_peer(
    listener: &TcpListener,
    events: &mpsc::UnboundedSender<SocketEvent>,
    config: &EndpointConfig,
) -> Result<Peer, RecvError> {
    loop {
        let (stream, addr) = listener.accept().await.map_err(RecvError::Io)?;
        let _ = events.send(SocketEvent::Accepted(addr));
        if !config.peer_allowed(addr.ip()) {
            warn!(peer = %addr, "peer rejected by allowlist");
            let _ = events.send(SocketEvent::HandshakeFailed(addr));
            continue;
        }
        let _ = stream.set_nodelay(true);
        let _ = events.send(SocketEvent::Connected(addr));
        debug!(peer = %addr, "peer connected");
        return Ok(Peer::new(stream, addr));
    }
}

async fn read_message(
    codec: &MultipartCodec,
    peer: &mut Peer,
) -> Result<Option<Message>, RecvError> {
    loop {
        if let Some(message) = codec.decode(&mut peer.buf).map_err(RecvError::Io)? {
            return Ok(Some(message));
        }
        let read = peer.stream.read_buf(&mut peer.buf).await.map_err(RecvError::Io)?;
        if read == 0 {
            return Ok(None);
        }
    }
}
