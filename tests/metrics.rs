#![cfg(feature = "metrics")]
//! Tests for `framelink` metric helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

#[test]
fn inbound_message_metric_increments() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        framelink::metrics::inc_messages(framelink::metrics::Direction::Inbound, 64);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == framelink::metrics::MESSAGES_TOTAL
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == "inbound")
            && matches!(v, DebugValue::Counter(c) if *c > 0)
    });
    assert!(found, "inbound messages metric not recorded");
}

#[test]
fn outbound_bytes_follow_message_payload() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        framelink::metrics::inc_messages(framelink::metrics::Direction::Outbound, 17);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == framelink::metrics::BYTES_TOTAL
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == "outbound")
            && matches!(v, DebugValue::Counter(c) if *c == 17)
    });
    assert!(found, "outbound bytes metric not recorded");
}

#[test]
fn error_metric_carries_kind_label() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        framelink::metrics::inc_errors("recv");
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == framelink::metrics::ERRORS_TOTAL
            && k.key()
                .labels()
                .any(|l| l.key() == "kind" && l.value() == "recv")
            && matches!(v, DebugValue::Counter(c) if *c > 0)
    });
    assert!(found, "error metric not recorded");
}

#[test]
fn connection_gauge_tracks_links() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        framelink::metrics::inc_connections();
        framelink::metrics::inc_connections();
        framelink::metrics::dec_connections();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == framelink::metrics::CONNECTIONS_ACTIVE
            && matches!(v, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    });
    assert!(found, "connection gauge not recorded");
}

#[rstest]
#[case(1)]
#[case(3)]
fn heartbeat_expirations_count(#[case] expected: u64) {
    // Arrange
    let (snapshotter, recorder) = debugging_recorder_setup();

    // Act
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| framelink::metrics::inc_heartbeat_expirations());
    });

    // Assert
    assert_counter_eq(
        &snapshotter,
        framelink::metrics::HEARTBEAT_EXPIRATIONS_TOTAL,
        expected,
    );
}

fn assert_counter_eq(snapshotter: &Snapshotter, name: &str, expected: u64) {
    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == name && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {metrics:#?}"
    );
}
