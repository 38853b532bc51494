#![cfg(feature = "metrics")]
//! Tests for `stompframe` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use stompframe::{
    AckMode,
    ChannelRegistry,
    Command,
    StompConnection,
    metrics::{self as stomp_metrics, Direction},
    registry::Subscriber,
};
use stompframe_testing::{SessionHarness, frame};

mod common;
use common::TestResult;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key().labels().any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_increments(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || stomp_metrics::inc_frames(direction));

    assert_eq!(
        counter_value(&snapshotter, stomp_metrics::FRAMES_PROCESSED, Some(("direction", label))),
        1
    );
}

#[test]
fn delivery_counts_reachable_subscribers() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let registry = ChannelRegistry::new();
    let live = SessionHarness::new()?;
    registry.register_session(live.session.id(), live.session.outbound());
    for session in [live.session.id(), stompframe::SessionId::next()] {
        registry.join(
            "/q",
            Subscriber {
                session,
                subscription: "s".to_owned(),
                ack_mode: AckMode::Auto,
            },
        );
    }

    metrics::with_local_recorder(&recorder, || {
        registry.deliver("/q", "a");
        registry.deliver("/q", "b");
    });

    assert_eq!(counter_value(&snapshotter, stomp_metrics::MESSAGES_DELIVERED, None), 2);
    Ok(())
}

#[tokio::test]
async fn protocol_errors_are_labelled_by_kind() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let _guard = metrics::set_default_local_recorder(&recorder);
    let mut harness = SessionHarness::new()?;
    harness.connect(None).await?;

    harness
        .send(frame(Command::Commit, &[("transaction", "nope")]))
        .await?;
    harness
        .send(frame(Command::Subscribe, &[("id", "0")]))
        .await?;

    assert_eq!(
        counter_value(&snapshotter, stomp_metrics::ERRORS_TOTAL, Some(("kind", "missing_header"))),
        1
    );
    assert_eq!(counter_value(&snapshotter, stomp_metrics::ERRORS_TOTAL, None), 1);
    Ok(())
}

#[test]
fn connection_gauge_tracks_live_connections() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let (session, _queues) = SessionHarness::new()?.into_parts();

    let gauge = metrics::with_local_recorder(&recorder, || {
        let connection = StompConnection::new(session);
        let value = gauge_value(&snapshotter);
        drop(connection);
        value
    });

    assert!((gauge - 1.0).abs() < f64::EPSILON);
    assert!(gauge_value(&snapshotter).abs() < f64::EPSILON);
    Ok(())
}

fn gauge_value(snapshotter: &Snapshotter) -> f64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(k, _, _, v)| match v {
            DebugValue::Gauge(g) if k.key().name() == stomp_metrics::CONNECTIONS_ACTIVE => {
                Some(g.into_inner())
            }
            _ => None,
        })
        .unwrap_or_default()
}
