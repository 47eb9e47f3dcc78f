//! Metric helpers for `framelink`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. The counters mirror the
//! [`crate::stats`] aggregates so embedders can scrape either surface;
//! `metrics-exporter-prometheus` ships behind the same feature for embedders
//! that want an HTTP scrape endpoint.

use metrics::{counter, gauge};

/// Name of the gauge tracking active peer links.
pub const CONNECTIONS_ACTIVE: &str = "framelink_connections_active";
/// Name of the counter tracking whole messages, labelled by direction.
pub const MESSAGES_TOTAL: &str = "framelink_messages_total";
/// Name of the counter tracking payload bytes, labelled by direction.
pub const BYTES_TOTAL: &str = "framelink_bytes_total";
/// Name of the counter tracking error occurrences, labelled by kind.
pub const ERRORS_TOTAL: &str = "framelink_errors_total";
/// Name of the counter tracking missed heartbeat deadlines.
pub const HEARTBEAT_EXPIRATIONS_TOTAL: &str = "framelink_heartbeat_expirations_total";

/// Direction of message flow.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Inbound messages received from a peer.
    Inbound,
    /// Outbound messages sent to a peer.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active peer link gauge.
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active peer link gauge.
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record one whole message and its payload bytes for the given direction.
pub fn inc_messages(direction: Direction, bytes: u64) {
    counter!(MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
    counter!(BYTES_TOTAL, "direction" => direction.as_str()).increment(bytes);
}

/// Record an error occurrence of the given kind.
pub fn inc_errors(kind: &'static str) {
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Record a missed heartbeat deadline.
pub fn inc_heartbeat_expirations() { counter!(HEARTBEAT_EXPIRATIONS_TOTAL).increment(1); }
