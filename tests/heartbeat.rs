//! Heart-beat scheduling observed through a running connection.

use std::{io, sync::Arc, time::Duration};

use async_stream::stream;
use stompframe::{CloseReason, Command, StompConnection, frame::Outbound};
use stompframe_testing::SessionHarness;

mod common;
use common::{TestResult, connect_text, frames};

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() -> TestResult {
    let harness = SessionHarness::new()?;
    let registry = Arc::clone(&harness.registry);
    let (session, mut queues) = harness.into_parts();
    let inbound = Box::pin(stream! {
        yield Ok::<_, io::Error>(connect_text(Some("100,0")));
        futures::future::pending::<()>().await;
    });

    let reason = StompConnection::new(session).run(inbound).await;

    let CloseReason::HeartbeatTimeout { expected, idle } = reason else {
        panic!("expected a heartbeat timeout, got {reason:?}");
    };
    assert_eq!(expected, Duration::from_millis(100));
    assert!(idle > expected);
    assert!(registry.live_sessions().is_empty());
    let out = queues.drain();
    let connected = frames(&out)[0];
    assert_eq!(connected.command(), Command::Connected);
    assert_eq!(connected.header("heart-beat"), Some("0,100"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chatty_peer_stays_connected() -> TestResult {
    let (session, _queues) = SessionHarness::new()?.into_parts();
    let inbound = Box::pin(stream! {
        yield Ok::<_, io::Error>(connect_text(Some("100,0")));
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            yield Ok("\n".to_owned());
        }
    });

    let reason = StompConnection::new(session).run(inbound).await;

    assert_eq!(reason, CloseReason::PeerClosed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keepalives_follow_negotiated_interval() -> TestResult {
    let (session, mut queues) = SessionHarness::new()?.into_parts();
    let inbound = Box::pin(stream! {
        yield Ok::<_, io::Error>(connect_text(Some("0,50")));
        tokio::time::sleep(Duration::from_millis(175)).await;
    });

    let reason = StompConnection::new(session).run(inbound).await;

    assert_eq!(reason, CloseReason::PeerClosed);
    let beats = queues
        .drain()
        .into_iter()
        .filter(|item| matches!(item, Outbound::Heartbeat))
        .count();
    assert_eq!(beats, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disabled_heartbeat_never_closes() -> TestResult {
    let (session, mut queues) = SessionHarness::new()?.into_parts();
    let inbound = Box::pin(stream! {
        yield Ok::<_, io::Error>(connect_text(Some("0,0")));
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let reason = StompConnection::new(session).run(inbound).await;

    assert_eq!(reason, CloseReason::PeerClosed);
    let out = queues.drain();
    assert!(out.iter().all(|item| !matches!(item, Outbound::Heartbeat)));
    assert_eq!(frames(&out)[0].header("heart-beat"), Some("0,0"));
    Ok(())
}
