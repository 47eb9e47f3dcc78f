//! Endpoint configuration.
//!
//! An [`EndpointConfig`] describes one messaging endpoint: its transport
//! address, socket role and mode, per-call timeouts, and heartbeat policy.
//! The configuration is immutable once a socket is opened from it.

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::{
    error::EndpointError,
    frame::{MAX_MESSAGE_LENGTH, clamp_message_length},
};

/// Default receive/send timeout, matching the transport's 1 s convention.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default cadence at which the serve loop evaluates the heartbeat deadline.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);
/// Default silence span after which a peer is considered heartbeat-expired.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default bound on one monitor event-channel poll.
pub const DEFAULT_MONITOR_POLL: Duration = Duration::from_millis(100);

/// Messaging pattern implemented by a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketRole {
    /// Server side of strict request/reply pairing.
    Reply,
    /// Client side of strict request/reply pairing.
    Request,
    /// One-way producer; never receives.
    Push,
    /// One-way consumer; never replies.
    Pull,
}

impl SocketRole {
    /// Whether a serve loop for this role sends a reply per received message.
    #[must_use]
    pub fn replies(self) -> bool { matches!(self, SocketRole::Reply) }
}

/// Whether the socket claims the address or dials it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketMode {
    /// Listen on the address and accept peers.
    Bind,
    /// Dial the address as a client.
    Connect,
}

/// Response to a heartbeat expiry.
///
/// The reconnect policy is deliberately configurable: whether an expired peer
/// is merely recorded or forcibly severed depends on the embedding
/// application. The server never dials out on its own; in bind mode a
/// reconnect is always peer-initiated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Record the expiry (state transition + counter) and keep the peer.
    #[default]
    Observe,
    /// Sever the silent peer so the transport forces it to reconnect.
    DropPeer,
}

/// Immutable description of one messaging endpoint.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    address: String,
    role: SocketRole,
    mode: SocketMode,
    recv_timeout: Duration,
    send_timeout: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    heartbeat_action: HeartbeatAction,
    monitor_poll: Duration,
    max_message_len: usize,
    allowed_peers: Option<Vec<IpAddr>>,
    name: Option<String>,
}

impl EndpointConfig {
    /// Describe an endpoint at `address` with the given role and mode.
    ///
    /// The address is a `host:port` pair, optionally prefixed with a
    /// `tcp://` scheme. Validation happens in [`socket_addr`](Self::socket_addr)
    /// so configs can be built before the address is known to be good, but
    /// sockets and servers validate eagerly at open.
    #[must_use]
    pub fn new(address: impl Into<String>, role: SocketRole, mode: SocketMode) -> Self {
        Self {
            address: address.into(),
            role,
            mode,
            recv_timeout: DEFAULT_MESSAGE_TIMEOUT,
            send_timeout: DEFAULT_MESSAGE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            heartbeat_action: HeartbeatAction::default(),
            monitor_poll: DEFAULT_MONITOR_POLL,
            max_message_len: MAX_MESSAGE_LENGTH,
            allowed_peers: None,
            name: None,
        }
    }

    /// Shorthand for a bind-mode reply server at `address`.
    #[must_use]
    pub fn reply_server(address: impl Into<String>) -> Self {
        Self::new(address, SocketRole::Reply, SocketMode::Bind)
    }

    /// Shorthand for a connect-mode request client at `address`.
    #[must_use]
    pub fn request_client(address: impl Into<String>) -> Self {
        Self::new(address, SocketRole::Request, SocketMode::Connect)
    }

    /// Set the bound on a single receive call.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the bound on a single send call.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the cadence of heartbeat-deadline checks.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the silence span after which a peer is heartbeat-expired.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the response to a heartbeat expiry.
    #[must_use]
    pub fn with_heartbeat_action(mut self, action: HeartbeatAction) -> Self {
        self.heartbeat_action = action;
        self
    }

    /// Set the bound on one monitor event-channel poll.
    #[must_use]
    pub fn with_monitor_poll(mut self, poll: Duration) -> Self {
        self.monitor_poll = poll;
        self
    }

    /// Set the maximum decoded message size, clamped to the supported range.
    #[must_use]
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = clamp_message_length(len);
        self
    }

    /// Restrict accepted peers to the given addresses.
    ///
    /// Peers outside the list are rejected at accept time and recorded as
    /// handshake failures. `None` (the default) admits any peer.
    #[must_use]
    pub fn with_allowed_peers(mut self, peers: Vec<IpAddr>) -> Self {
        self.allowed_peers = Some(peers);
        self
    }

    /// Label log output from this endpoint with `name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured address string, scheme included if one was given.
    #[must_use]
    pub fn address(&self) -> &str { &self.address }

    /// The socket role.
    #[must_use]
    pub fn role(&self) -> SocketRole { self.role }

    /// Bind or connect.
    #[must_use]
    pub fn mode(&self) -> SocketMode { self.mode }

    /// Bound on a single receive call.
    #[must_use]
    pub fn recv_timeout(&self) -> Duration { self.recv_timeout }

    /// Bound on a single send call.
    #[must_use]
    pub fn send_timeout(&self) -> Duration { self.send_timeout }

    /// Cadence of heartbeat-deadline checks.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration { self.heartbeat_interval }

    /// Silence span after which a peer is heartbeat-expired.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration { self.heartbeat_timeout }

    /// Response to a heartbeat expiry.
    #[must_use]
    pub fn heartbeat_action(&self) -> HeartbeatAction { self.heartbeat_action }

    /// Bound on one monitor event-channel poll.
    #[must_use]
    pub fn monitor_poll(&self) -> Duration { self.monitor_poll }

    /// Maximum decoded message size.
    #[must_use]
    pub fn max_message_len(&self) -> usize { self.max_message_len }

    /// Log label for this endpoint, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    /// Whether `peer` passes the allowlist.
    #[must_use]
    pub fn peer_allowed(&self, peer: IpAddr) -> bool {
        self.allowed_peers
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&peer))
    }

    /// Parse the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddress`] if the address carries a
    /// scheme other than `tcp://` or does not parse as `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, EndpointError> {
        let bare = match self.address.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(EndpointError::InvalidAddress(self.address.clone())),
            None => self.address.as_str(),
        };
        bare.parse()
            .map_err(|_| EndpointError::InvalidAddress(self.address.clone()))
    }
}
