//! Unit tests for the session state machine.

use std::sync::Mutex;

use async_trait::async_trait;
use rstest::rstest;

use super::*;
use crate::{handler::HandlerError, push::PushQueues};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<StompEvent>>,
    fail_on: Option<EventKind>,
}

impl Recorder {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().expect("lock").iter().map(|e| e.kind).collect()
    }

    fn events(&self) -> Vec<StompEvent> { self.events.lock().expect("lock").clone() }
}

#[async_trait]
impl EventDispatcher for Recorder {
    async fn dispatch(&self, event: &StompEvent) -> Result<DispatchOutcome, HandlerError> {
        if self.fail_on == Some(event.kind) {
            return Err(HandlerError::new("handler exploded"));
        }
        self.events.lock().expect("lock").push(event.clone());
        Ok(DispatchOutcome::Handled)
    }
}

struct Harness {
    session: StompSession,
    queues: PushQueues<Outbound>,
    registry: Arc<ChannelRegistry>,
    recorder: Arc<Recorder>,
}

impl Harness {
    fn new() -> Self { Self::with_recorder(Recorder::default()) }

    fn with_recorder(recorder: Recorder) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let recorder = Arc::new(recorder);
        let (queues, handle) = PushQueues::builder()
            .high_capacity(32)
            .low_capacity(32)
            .build()
            .expect("queues");
        let dispatcher: Arc<dyn EventDispatcher> = recorder.clone();
        let session = StompSession::new(SessionId::next(), Arc::clone(&registry), dispatcher, handle);
        Self {
            session,
            queues,
            registry,
            recorder,
        }
    }

    async fn send(&mut self, command: Command, headers: &[(&str, &str)]) -> Result<(), SessionError> {
        self.send_with_body(command, headers, "").await
    }

    async fn send_with_body(
        &mut self,
        command: Command,
        headers: &[(&str, &str)],
        body: &'static str,
    ) -> Result<(), SessionError> {
        let mut frame = Frame::new(command).with_body(body);
        for (name, value) in headers {
            frame = frame.with_header(*name, *value);
        }
        self.session.handle(frame).await
    }

    async fn connected(mut self) -> Self {
        self.send(Command::Connect, &[("accept-version", "1.2")])
            .await
            .expect("connect");
        self.frames();
        self
    }

    fn frames(&mut self) -> Vec<Frame> {
        self.queues
            .drain()
            .into_iter()
            .filter_map(|out| out.frame().cloned())
            .collect()
    }

    fn commands(&mut self) -> Vec<Command> {
        self.frames().iter().map(Frame::command).collect()
    }
}

#[tokio::test]
async fn connect_replies_connected_and_dispatches() {
    let mut h = Harness::new();
    h.send(Command::Connect, &[("accept-version", "1.2"), ("heart-beat", "0,0")])
        .await
        .expect("connect");

    let frames = h.frames();
    assert_eq!(frames.len(), 1);
    let connected = &frames[0];
    assert_eq!(connected.command(), Command::Connected);
    assert_eq!(connected.header("version"), Some("1.2"));
    assert_eq!(connected.header("heart-beat"), Some("0,0"));
    let session_header = h.session.id().to_string();
    assert_eq!(connected.header("session"), Some(session_header.as_str()));
    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(h.session.heartbeat(), None);
    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect]);
}

#[tokio::test]
async fn connect_without_heartbeat_omits_header() {
    let mut h = Harness::new();
    h.send(Command::Stomp, &[]).await.expect("connect");
    let frames = h.frames();
    assert_eq!(frames[0].header("heart-beat"), None);
}

#[tokio::test]
async fn connect_negotiates_heartbeat() {
    let mut h = Harness::new();
    h.send(Command::Connect, &[("heart-beat", "3000,4000")])
        .await
        .expect("connect");

    let frames = h.frames();
    assert_eq!(frames[0].header("heart-beat"), Some("4000,3000"));
    let hb = h.session.heartbeat().expect("heartbeat running");
    assert_eq!(hb.outgoing, Some(std::time::Duration::from_millis(4000)));
    assert_eq!(hb.incoming, Some(std::time::Duration::from_millis(3000)));
}

#[tokio::test]
async fn malformed_heartbeat_is_reported_and_disabled() {
    let mut h = Harness::new();
    h.send(Command::Connect, &[("heart-beat", "soon")])
        .await
        .expect("connect survives");

    let commands = h.commands();
    assert!(commands.contains(&Command::Connected));
    assert!(commands.contains(&Command::Error));
    assert_eq!(h.session.heartbeat(), None);
    assert_eq!(h.session.state(), SessionState::Connected);
}

#[rstest]
#[case(Command::Send)]
#[case(Command::Subscribe)]
#[case(Command::Disconnect)]
#[tokio::test]
async fn frames_before_connect_are_fatal(#[case] command: Command) {
    let mut h = Harness::new();
    let err = h.send(command, &[]).await.expect_err("must fail");
    assert!(matches!(err, SessionError::NotConnected(c) if c == command));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn second_connect_is_fatal() {
    let mut h = Harness::new().connected().await;
    let err = h.send(Command::Connect, &[]).await.expect_err("must fail");
    assert!(matches!(err, SessionError::AlreadyConnected));
}

#[tokio::test]
async fn send_dispatches_message_event() {
    let mut h = Harness::new().connected().await;
    h.send_with_body(Command::Send, &[("destination", "/q"), ("x-trace", "7")], "hi")
        .await
        .expect("send");

    let events = h.recorder.events();
    let event = events.last().expect("event");
    assert_eq!(event.kind, EventKind::Message);
    assert_eq!(event.destination.as_deref(), Some("/q"));
    assert_eq!(event.body.as_deref(), Some(&b"hi"[..]));
    assert_eq!(event.headers.get("x-trace"), Some("7"));
    assert!(h.session.request_headers().is_empty());
}

#[tokio::test]
async fn subscribe_registers_and_records_ack_mode() {
    let mut h = Harness::new().connected().await;
    h.send(
        Command::Subscribe,
        &[("id", "s1"), ("destination", "/q"), ("ack", "client")],
    )
    .await
    .expect("subscribe");

    assert_eq!(h.session.ack_mode("s1"), Some(AckMode::Client));
    assert_eq!(h.session.subscription_id("/q"), Some("s1"));
    assert!(h.registry.is_subscribed("/q", h.session.id()));
    assert_eq!(h.recorder.kinds().last(), Some(&EventKind::Subscribe));
}

#[tokio::test]
async fn ack_mode_defaults_to_auto() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/q")])
        .await
        .expect("subscribe");
    assert_eq!(h.session.ack_mode("s1"), Some(AckMode::Auto));
}

#[tokio::test]
async fn duplicate_subscribe_is_rejected() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/queue/a")])
        .await
        .expect("subscribe");
    h.send(Command::Subscribe, &[("id", "s2"), ("destination", "/queue/a")])
        .await
        .expect("soft error");

    let frames = h.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::Error);
    assert_eq!(h.registry.subscribers("/queue/a").len(), 1);
    assert_eq!(h.session.subscription_id("/queue/a"), Some("s1"));
    assert_eq!(h.session.ack_mode("s2"), None);
}

#[rstest]
#[case(&[("destination", "/b")][..])]
#[case(&[("id", "s1")][..])]
#[case(&[("id", "s9"), ("destination", "/c"), ("ack", "sometimes")][..])]
#[tokio::test]
async fn invalid_subscribe_yields_error(#[case] headers: &[(&str, &str)]) {
    let mut h = Harness::new().connected().await;
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/a")])
        .await
        .expect("subscribe");
    h.send(Command::Subscribe, headers).await.expect("soft error");

    assert_eq!(h.commands(), vec![Command::Error]);
    assert_eq!(h.registry.destinations(), vec!["/a".to_owned()]);
}

#[tokio::test]
async fn reused_subscription_id_is_rejected() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/a")])
        .await
        .expect("subscribe");
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/b")])
        .await
        .expect("soft error");

    assert_eq!(h.commands(), vec![Command::Error]);
    assert!(!h.registry.is_subscribed("/b", h.session.id()));
}

#[tokio::test]
async fn unsubscribe_leaves_channel() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Subscribe, &[("id", "s1"), ("destination", "/q")])
        .await
        .expect("subscribe");
    h.send(Command::Unsubscribe, &[("id", "s1")])
        .await
        .expect("unsubscribe");

    assert!(h.registry.destinations().is_empty());
    assert_eq!(h.session.subscription_id("/q"), None);
    assert_eq!(h.recorder.kinds().last(), Some(&EventKind::Unsubscribe));
}

#[tokio::test]
async fn unsubscribe_unknown_is_silent() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Unsubscribe, &[("id", "nope")])
        .await
        .expect("no-op");
    assert!(h.frames().is_empty());
    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect]);
}

#[tokio::test]
async fn cumulative_ack_dispatches_oldest_first() {
    let mut h = Harness::new().connected().await;
    h.send(
        Command::Subscribe,
        &[("id", "s1"), ("destination", "/q"), ("ack", "client")],
    )
    .await
    .expect("subscribe");
    let ids: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|body| h.registry.deliver("/q", *body))
        .collect();
    h.frames();

    h.send(Command::Ack, &[("id", ids[1].as_str())])
        .await
        .expect("ack");

    let acks: Vec<_> = h
        .recorder
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Ack)
        .collect();
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].headers.get("message-id"), Some(ids[0].as_str()));
    assert_eq!(acks[0].headers.get("message"), Some("a"));
    assert_eq!(acks[1].headers.get("message-id"), Some(ids[1].as_str()));
    let origin = h.session.id().to_string();
    assert_eq!(acks[1].headers.get("origin-session"), Some(origin.as_str()));
    assert_eq!(h.registry.outstanding(h.session.id(), "s1"), vec![ids[2].clone()]);
    assert!(h.session.request_headers().is_empty());
}

#[tokio::test]
async fn individual_nack_releases_one_message() {
    let mut h = Harness::new().connected().await;
    h.send(
        Command::Subscribe,
        &[("id", "s1"), ("destination", "/q"), ("ack", "client-individual")],
    )
    .await
    .expect("subscribe");
    let first = h.registry.deliver("/q", "a");
    let second = h.registry.deliver("/q", "b");

    h.send(Command::Nack, &[("id", second.as_str())])
        .await
        .expect("nack");

    assert_eq!(h.recorder.kinds().last(), Some(&EventKind::Nack));
    assert_eq!(h.registry.outstanding(h.session.id(), "s1"), vec![first]);
}

#[tokio::test]
async fn ack_of_unknown_message_is_an_error() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Ack, &[("id", "msg-404")]).await.expect("soft error");
    assert_eq!(h.commands(), vec![Command::Error]);
}

#[tokio::test]
async fn transaction_defers_until_commit() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Begin, &[("transaction", "tx1")])
        .await
        .expect("begin");
    h.send_with_body(Command::Send, &[("destination", "/q"), ("transaction", "tx1")], "1")
        .await
        .expect("send");
    h.send_with_body(Command::Send, &[("destination", "/q"), ("transaction", "tx1")], "2")
        .await
        .expect("send");
    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect]);

    h.send(Command::Commit, &[("transaction", "tx1")])
        .await
        .expect("commit");

    let bodies: Vec<_> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| e.body)
        .collect();
    assert_eq!(bodies, vec![bytes::Bytes::from("1"), bytes::Bytes::from("2")]);
    let events = h.recorder.events();
    assert!(events.iter().all(|e| !e.headers.contains("transaction")));
    assert_eq!(h.session.open_transactions(), 0);
}

#[tokio::test]
async fn abort_discards_buffer() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Begin, &[("transaction", "tx1")])
        .await
        .expect("begin");
    h.send(Command::Send, &[("destination", "/q"), ("transaction", "tx1")])
        .await
        .expect("send");
    h.send(Command::Abort, &[("transaction", "tx1")])
        .await
        .expect("abort");
    h.send(Command::Commit, &[("transaction", "tx1")])
        .await
        .expect("commit is a no-op");

    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect]);
    assert!(h.frames().is_empty());
}

#[tokio::test]
async fn send_in_unknown_transaction_is_an_error() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Send, &[("destination", "/q"), ("transaction", "ghost")])
        .await
        .expect("soft error");

    let frames = h.frames();
    assert_eq!(frames[0].command(), Command::Error);
    assert!(frames[0]
        .header("message")
        .is_some_and(|m| m.starts_with("No Transaction found")));
}

#[tokio::test]
async fn duplicate_begin_keeps_existing_buffer() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Begin, &[("transaction", "tx")]).await.expect("begin");
    h.send(Command::Send, &[("destination", "/q"), ("transaction", "tx")])
        .await
        .expect("send");
    h.send(Command::Begin, &[("transaction", "tx")]).await.expect("soft error");
    assert_eq!(h.commands(), vec![Command::Error]);

    h.send(Command::Commit, &[("transaction", "tx")]).await.expect("commit");
    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect, EventKind::Message]);
}

#[tokio::test]
async fn receipts_follow_successful_frames() {
    let mut h = Harness::new().connected().await;
    h.send(
        Command::Subscribe,
        &[("id", "s1"), ("destination", "/q"), ("receipt", "r-1")],
    )
    .await
    .expect("subscribe");

    let frames = h.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::Receipt);
    assert_eq!(frames[0].header("receipt-id"), Some("r-1"));
}

#[tokio::test]
async fn error_replies_echo_receipt() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Ack, &[("id", "missing"), ("receipt", "r-2")])
        .await
        .expect("soft error");
    let frames = h.frames();
    assert_eq!(frames[0].command(), Command::Error);
    assert_eq!(frames[0].header("receipt-id"), Some("r-2"));
}

#[tokio::test]
async fn server_commands_from_client_are_rejected() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Message, &[]).await.expect("soft error");
    assert_eq!(h.commands(), vec![Command::Error]);
}

#[tokio::test]
async fn disconnect_sends_receipt_and_ignores_later_frames() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Begin, &[("transaction", "tx")]).await.expect("begin");
    h.send(Command::Disconnect, &[("receipt", "bye")])
        .await
        .expect("disconnect");

    let frames = h.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header("receipt-id"), Some("bye"));
    assert_eq!(h.session.state(), SessionState::Closing);
    assert_eq!(h.session.open_transactions(), 0);

    h.send(Command::Send, &[("destination", "/q")])
        .await
        .expect("ignored");
    assert!(h.frames().is_empty());
    assert_eq!(h.recorder.kinds(), vec![EventKind::Connect]);
}

#[tokio::test]
async fn disconnect_without_receipt_is_silent() {
    let mut h = Harness::new().connected().await;
    h.send(Command::Disconnect, &[]).await.expect("disconnect");
    assert!(h.frames().is_empty());
}

#[tokio::test]
async fn handler_failure_is_fatal() {
    let mut h = Harness::with_recorder(Recorder {
        fail_on: Some(EventKind::Message),
        ..Recorder::default()
    })
    .connected()
    .await;

    let err = h
        .send(Command::Send, &[("destination", "/q")])
        .await
        .expect_err("must fail");
    assert!(matches!(err, SessionError::Handler(_)));
    assert!(err.is_fatal());
    assert!(h.session.request_headers().is_empty());
}

#[tokio::test]
async fn close_purges_registry_and_is_idempotent() {
    let mut h = Harness::new().connected().await;
    h.send(
        Command::Subscribe,
        &[("id", "s1"), ("destination", "/q"), ("ack", "client")],
    )
    .await
    .expect("subscribe");
    h.registry.deliver("/q", "pending");

    h.session.close();
    h.session.close();

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(h.registry.destinations().is_empty());
    assert!(h.registry.outstanding(h.session.id(), "s1").is_empty());
    let err = h.send(Command::Send, &[]).await.expect_err("closed");
    assert!(matches!(err, SessionError::Closed));
}

#[tokio::test]
async fn dropping_session_tears_down() {
    let h = Harness::new().connected().await;
    let Harness {
        mut session,
        registry,
        ..
    } = h;
    session
        .handle(
            Frame::new(Command::Subscribe)
                .with_header("id", "s1")
                .with_header("destination", "/q"),
        )
        .await
        .expect("subscribe");
    drop(session);
    assert!(registry.destinations().is_empty());
}
