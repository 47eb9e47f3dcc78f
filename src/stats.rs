//! Shared counter aggregates.
//!
//! [`ServerCounters`] is the generic counter set every server kind shares;
//! [`MessagingCounters`] composes it with messaging-specific counters
//! (heartbeat expirations, reconnects, peer rejections, handler failures).
//! The [`CounterSet`] trait is the seam a metrics exporter reads through.
//!
//! All counters are monotonic relaxed atomics. The serve loop and the monitor
//! loop write disjoint subsets, so increments need no coordination.
//! [`CounterSet::snapshot`] never blocks the writers; a snapshot taken while
//! both writers are active may mix counter values from slightly different
//! instants, which is acceptable for a metrics scrape because every counter
//! only ever grows.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use crate::metrics::{self, Direction};

/// Point-in-time copy of an endpoint's counters.
///
/// Extension counters of server kinds that do not carry them read zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Whole messages received.
    pub messages_received: u64,
    /// Whole messages sent.
    pub messages_sent: u64,
    /// Payload bytes received, summed across frames.
    pub bytes_received: u64,
    /// Payload bytes sent, summed across frames.
    pub bytes_sent: u64,
    /// Peer links established.
    pub connects: u64,
    /// Peer links lost.
    pub disconnects: u64,
    /// Failed receive calls (timeouts excluded).
    pub recv_errors: u64,
    /// Failed send calls.
    pub send_errors: u64,
    /// Heartbeat deadlines missed.
    pub heartbeat_expirations: u64,
    /// Peers that returned after an expiry or disconnect.
    pub reconnects: u64,
    /// Peers rejected at admission.
    pub handshake_failures: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Lifecycle notifications observed but not classed as a link transition.
    pub ignored_events: u64,
}

/// Read interface over a counter aggregate.
pub trait CounterSet: Send + Sync {
    /// The generic counter set shared by all server kinds.
    fn base(&self) -> &ServerCounters;

    /// Non-blocking copy of the current counter values.
    fn snapshot(&self) -> StatsSnapshot;
}

/// Generic counter set shared by every server kind.
#[derive(Debug, Default)]
pub struct ServerCounters {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    recv_errors: AtomicU64,
    send_errors: AtomicU64,
}

impl ServerCounters {
    /// Record one received message of `bytes` payload bytes.
    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_messages(Direction::Inbound, bytes);
    }

    /// Record one sent message of `bytes` payload bytes.
    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_messages(Direction::Outbound, bytes);
    }

    /// Record one established peer link.
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_connections();
    }

    /// Record one lost peer link.
    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::dec_connections();
    }

    /// Record one failed receive call.
    pub fn record_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_errors("recv");
    }

    /// Record one failed send call.
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_errors("send");
    }

    fn fill(&self, snapshot: &mut StatsSnapshot) {
        snapshot.messages_received = self.messages_received.load(Ordering::Relaxed);
        snapshot.messages_sent = self.messages_sent.load(Ordering::Relaxed);
        snapshot.bytes_received = self.bytes_received.load(Ordering::Relaxed);
        snapshot.bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        snapshot.connects = self.connects.load(Ordering::Relaxed);
        snapshot.disconnects = self.disconnects.load(Ordering::Relaxed);
        snapshot.recv_errors = self.recv_errors.load(Ordering::Relaxed);
        snapshot.send_errors = self.send_errors.load(Ordering::Relaxed);
    }
}

impl CounterSet for ServerCounters {
    fn base(&self) -> &ServerCounters { self }

    fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();
        self.fill(&mut snapshot);
        snapshot
    }
}

/// Counter aggregate for a messaging server.
///
/// Composes the generic set with messaging-specific liveness counters.
#[derive(Debug, Default)]
pub struct MessagingCounters {
    base: ServerCounters,
    heartbeat_expirations: AtomicU64,
    reconnects: AtomicU64,
    handshake_failures: AtomicU64,
    handler_failures: AtomicU64,
    ignored_events: AtomicU64,
}

impl MessagingCounters {
    /// Record one missed heartbeat deadline.
    pub fn record_heartbeat_expired(&self) {
        self.heartbeat_expirations.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_heartbeat_expirations();
    }

    /// Record a peer returning after an expiry or disconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a peer rejected at admission.
    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_errors("handshake");
    }

    /// Record a failed or panicked handler invocation.
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::inc_errors("handler");
    }

    /// Record a lifecycle notification that carried no link transition.
    pub fn record_ignored_event(&self) {
        self.ignored_events.fetch_add(1, Ordering::Relaxed);
    }
}

impl CounterSet for MessagingCounters {
    fn base(&self) -> &ServerCounters { &self.base }

    fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();
        self.base.fill(&mut snapshot);
        snapshot.heartbeat_expirations = self.heartbeat_expirations.load(Ordering::Relaxed);
        snapshot.reconnects = self.reconnects.load(Ordering::Relaxed);
        snapshot.handshake_failures = self.handshake_failures.load(Ordering::Relaxed);
        snapshot.handler_failures = self.handler_failures.load(Ordering::Relaxed);
        snapshot.ignored_events = self.ignored_events.load(Ordering::Relaxed);
        snapshot
    }
}
