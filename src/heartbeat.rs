//! Heart-beat negotiation and per-connection liveness timers.
//!
//! A client proposes `cx,cy` in its `heart-beat` header: it can send at
//! least every `cx` milliseconds and wants to hear from the server at least
//! every `cy` milliseconds. The server therefore sends keepalives every `cy`
//! and expects inbound traffic every `cx`. Zero disables a direction.
//!
//! [`HeartbeatScheduler`] runs each enabled direction as its own task. Both
//! tasks share one cancellation token and poll it ahead of their tick, so a
//! stopped scheduler never acts on a tick that raced with the stop.

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    connection::{CloseReason, CloseSignal},
    frame::Outbound,
    push::{PushError, PushHandle, PushPolicy, PushPriority},
};

/// Returned when a `heart-beat` header is not `<int>,<int>`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed heart-beat header: {0:?}")]
pub struct HeartbeatError(pub String);

/// Intervals proposed by a client, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatSpec {
    /// Smallest interval at which the client can send.
    pub client_send: u64,
    /// Interval at which the client wants to receive.
    pub client_receive: u64,
}

impl FromStr for HeartbeatSpec {
    type Err = HeartbeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HeartbeatError(s.to_owned());
        let (send, receive) = s.split_once(',').ok_or_else(malformed)?;
        Ok(Self {
            client_send: send.trim().parse().map_err(|_| malformed())?,
            client_receive: receive.trim().parse().map_err(|_| malformed())?,
        })
    }
}

/// Negotiated heart-beat intervals as seen from the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// How often the server sends a keepalive.
    pub outgoing: Option<Duration>,
    /// How often the server expects inbound traffic.
    pub incoming: Option<Duration>,
}

impl Heartbeat {
    /// Both directions switched off.
    pub const DISABLED: Self = Self {
        outgoing: None,
        incoming: None,
    };

    /// Derive the server's intervals from a client proposal.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use stompframe::heartbeat::{Heartbeat, HeartbeatSpec};
    ///
    /// let spec: HeartbeatSpec = "3000,4000".parse().expect("valid header");
    /// let hb = Heartbeat::negotiate(spec);
    /// assert_eq!(hb.outgoing, Some(Duration::from_millis(4000)));
    /// assert_eq!(hb.incoming, Some(Duration::from_millis(3000)));
    /// ```
    #[must_use]
    pub fn negotiate(spec: HeartbeatSpec) -> Self {
        let period = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            outgoing: period(spec.client_receive),
            incoming: period(spec.client_send),
        }
    }

    /// Value of the CONNECTED frame's `heart-beat` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        let ms = |d: Option<Duration>| d.map_or(0, |d| d.as_millis());
        format!("{},{}", ms(self.outgoing), ms(self.incoming))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool { self.outgoing.is_some() || self.incoming.is_some() }
}

/// Time of the most recent inbound traffic on a connection.
#[derive(Debug)]
pub struct LastActivity {
    origin: Instant,
    millis: AtomicU64,
}

impl Default for LastActivity {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            millis: AtomicU64::new(0),
        }
    }
}

impl LastActivity {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record inbound traffic now.
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last recorded traffic.
    #[must_use]
    pub fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.millis.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

/// Running heart-beat timers of one connection.
///
/// Dropping the scheduler stops both timers.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    heartbeat: Heartbeat,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Spawn a task for every enabled direction of `heartbeat`.
    ///
    /// The sender pushes [`Outbound::Heartbeat`] on the high-priority queue
    /// every outgoing period. The watcher triggers `close` with
    /// [`CloseReason::HeartbeatTimeout`] once `activity` has been idle for
    /// longer than the incoming period plus `tolerance`.
    #[must_use]
    pub fn start(
        heartbeat: Heartbeat,
        outbound: PushHandle<Outbound>,
        activity: Arc<LastActivity>,
        close: CloseSignal,
        tolerance: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);
        if let Some(period) = heartbeat.outgoing {
            tasks.push(tokio::spawn(send_keepalives(period, outbound, token.clone())));
        }
        if let Some(period) = heartbeat.incoming {
            tasks.push(tokio::spawn(watch_peer(
                period,
                tolerance,
                activity,
                close,
                token.clone(),
            )));
        }
        debug!(
            outgoing_ms = heartbeat.outgoing.map(|d| d.as_millis()),
            incoming_ms = heartbeat.incoming.map(|d| d.as_millis()),
            "heartbeat timers started"
        );
        Self {
            heartbeat,
            token,
            tasks,
        }
    }

    #[must_use]
    pub fn heartbeat(&self) -> Heartbeat { self.heartbeat }

    /// Cancel both timers. Idempotent.
    pub fn stop(&self) { self.token.cancel(); }

    #[must_use]
    pub fn is_stopped(&self) -> bool { self.token.is_cancelled() }

    /// Stop the timers and wait for their tasks to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) { self.token.cancel(); }
}

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn send_keepalives(period: Duration, outbound: PushHandle<Outbound>, token: CancellationToken) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(PushError::Closed) =
                    outbound.try_push(Outbound::Heartbeat, PushPriority::High, PushPolicy::DropIfFull)
                {
                    break;
                }
            }
        }
    }
    debug!("heartbeat sender stopped");
}

async fn watch_peer(
    period: Duration,
    tolerance: Duration,
    activity: Arc<LastActivity>,
    close: CloseSignal,
    token: CancellationToken,
) {
    let mut ticker = ticker(period);
    let limit = period + tolerance;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let idle = activity.idle();
                if idle > limit {
                    warn!(
                        idle_ms = idle.as_millis(),
                        expected_ms = period.as_millis(),
                        "peer heartbeat missed"
                    );
                    close.trigger(CloseReason::HeartbeatTimeout { expected: period, idle });
                    break;
                }
            }
        }
    }
    debug!("heartbeat watcher stopped");
}
