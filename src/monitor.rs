//! Connection-liveness monitoring.
//!
//! The [`ConnectionMonitor`] owns a dedicated observation loop that drains a
//! socket's event channel, translates low-level [`SocketEvent`]s into the
//! [`LinkState`] model, and updates the shared counter aggregate. Each
//! channel read is bounded by a poll interval so the loop observes
//! cancellation within one interval even when the socket is silent.
//!
//! The loop never exits on a surprising event: notifications that carry no
//! link transition are counted and logged, and only an explicit stop (or the
//! shared shutdown token) ends observation. On exit the loop drains events
//! already queued, so links reach their terminal state even when shutdown
//! races the final notifications.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::EndpointError,
    socket::{SocketEvent, SocketEvents},
    stats::{CounterSet, MessagingCounters},
};

/// Retained transitions per link, oldest dropped first.
const HISTORY_LIMIT: usize = 32;

/// Tracked links above this count trigger eviction of terminal records.
const LINK_LIMIT: usize = 1024;

/// Lifecycle state of one logical peer link.
///
/// At most one of `Connecting`/`Connected` holds at a time per link.
/// `HeartbeatExpired` always precedes either a reconnect attempt (back to
/// `Connecting`) or `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No transport link exists yet.
    Unconnected,
    /// A link is being admitted or re-established.
    Connecting,
    /// The link is fully established.
    Connected,
    /// The peer went silent past the heartbeat deadline.
    HeartbeatExpired,
    /// The transport link went away.
    Disconnected,
    /// The endpoint itself shut the link down.
    Closed,
}

#[derive(Debug)]
struct LinkRecord {
    state: LinkState,
    history: Vec<LinkState>,
}

impl LinkRecord {
    fn new() -> Self {
        Self {
            state: LinkState::Unconnected,
            history: Vec::new(),
        }
    }

    fn transition(&mut self, next: LinkState) {
        self.state = next;
        if self.history.len() == HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history.push(next);
    }
}

/// Per-peer link states, shared between the monitor loop (lifecycle writer),
/// the serve loop (heartbeat writer), and observers.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: DashMap<SocketAddr, LinkRecord>,
}

impl LinkTable {
    /// Current state of the link to `peer`.
    #[must_use]
    pub fn state(&self, peer: SocketAddr) -> Option<LinkState> {
        self.links.get(&peer).map(|record| record.state)
    }

    /// Ordered recent transitions of the link to `peer`.
    #[must_use]
    pub fn history(&self, peer: SocketAddr) -> Vec<LinkState> {
        self.links
            .get(&peer)
            .map(|record| record.history.clone())
            .unwrap_or_default()
    }

    /// Number of tracked links.
    #[must_use]
    pub fn len(&self) -> usize { self.links.len() }

    /// `true` if no link has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.links.is_empty() }

    /// Record a transition for `peer`, returning the previous state.
    ///
    /// Reconnecting peers arrive from fresh ephemeral ports, so the table
    /// would grow without bound; past [`LINK_LIMIT`] tracked links, records
    /// already in a terminal state are evicted. The link just touched is
    /// always kept.
    pub(crate) fn transition(&self, peer: SocketAddr, next: LinkState) -> LinkState {
        let previous = {
            let mut record = self.links.entry(peer).or_insert_with(LinkRecord::new);
            let previous = record.state;
            record.transition(next);
            previous
        };
        // The entry guard must be released before retain touches the shards.
        if self.links.len() > LINK_LIMIT {
            self.links.retain(|addr, record| {
                *addr == peer
                    || !matches!(record.state, LinkState::Disconnected | LinkState::Closed)
            });
        }
        previous
    }

    fn close_all(&self) {
        for mut record in self.links.iter_mut() {
            if record.state != LinkState::Closed {
                record.transition(LinkState::Closed);
            }
        }
    }
}

/// Observer translating socket lifecycle events into link states and
/// counters.
pub struct ConnectionMonitor {
    links: Arc<LinkTable>,
    counters: Arc<MessagingCounters>,
    poll: Duration,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionMonitor {
    /// Create a monitor writing to `links` and `counters`.
    ///
    /// The monitor observes `shutdown` through a child token, so it stops
    /// with the shared flag but can also be stopped on its own.
    #[must_use]
    pub fn new(
        links: Arc<LinkTable>,
        counters: Arc<MessagingCounters>,
        poll: Duration,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            links,
            counters,
            poll,
            stop: shutdown.child_token(),
            task: None,
        }
    }

    /// The link table this monitor writes to.
    #[must_use]
    pub fn links(&self) -> Arc<LinkTable> { Arc::clone(&self.links) }

    /// Begin the observation loop over `events`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::AlreadyRunning`] if the loop was already
    /// started.
    pub fn start(&mut self, events: SocketEvents) -> Result<(), EndpointError> {
        if self.task.is_some() {
            return Err(EndpointError::AlreadyRunning);
        }
        let links = Arc::clone(&self.links);
        let counters = Arc::clone(&self.counters);
        let poll = self.poll;
        let stop = self.stop.clone();
        self.task = Some(tokio::spawn(observe_loop(events, links, counters, poll, stop)));
        info!("connection monitor started");
        Ok(())
    }

    /// Stop the observation loop and wait for it to finish.
    ///
    /// Idempotent: stopping an already-stopped monitor is a no-op.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                warn!("monitor task ended abnormally");
            }
            info!("connection monitor stopped");
        }
    }
}

async fn observe_loop(
    mut events: SocketEvents,
    links: Arc<LinkTable>,
    counters: Arc<MessagingCounters>,
    poll: Duration,
    stop: CancellationToken,
) {
    loop {
        if stop.is_cancelled() {
            break;
        }
        match time::timeout(poll, events.next()).await {
            Ok(Some(event)) => classify(event, &links, &counters),
            Ok(None) => {
                // Event channel gone means the socket is being torn down;
                // hold position until the owner requests a stop.
                stop.cancelled().await;
                break;
            }
            // Poll bound elapsed with no event; re-check the stop flag.
            Err(_) => {}
        }
    }

    // Events queued before the stop was observed still describe real link
    // transitions; classify them so links land in their terminal state.
    while let Some(event) = events.try_next() {
        classify(event, &links, &counters);
    }
}

fn classify(event: SocketEvent, links: &LinkTable, counters: &MessagingCounters) {
    match event {
        SocketEvent::Accepted(peer) | SocketEvent::Dialing(peer) => {
            let previous = links.transition(peer, LinkState::Connecting);
            if matches!(
                previous,
                LinkState::HeartbeatExpired | LinkState::Disconnected
            ) {
                counters.record_reconnect();
                debug!(%peer, "peer reconnecting");
            } else {
                debug!(%peer, "peer connecting");
            }
        }
        SocketEvent::Connected(peer) => {
            links.transition(peer, LinkState::Connected);
            counters.base().record_connect();
            debug!(%peer, "peer link established");
        }
        SocketEvent::Disconnected(peer) => {
            links.transition(peer, LinkState::Disconnected);
            counters.base().record_disconnect();
            debug!(%peer, "peer link lost");
        }
        SocketEvent::HandshakeFailed(peer) => {
            links.transition(peer, LinkState::Closed);
            counters.record_handshake_failure();
            warn!(%peer, "peer admission failed");
        }
        SocketEvent::Closed => {
            links.close_all();
            debug!("socket closed; all links closed");
        }
        // Not a per-link lifecycle change; count it and move on.
        SocketEvent::Listening(local) => {
            counters.record_ignored_event();
            debug!(%local, "listening");
        }
    }
}
