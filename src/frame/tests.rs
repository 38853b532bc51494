//! Unit tests for frame and header helpers.

use rstest::rstest;

use super::*;

#[rstest]
#[case("send")]
#[case("Connect")]
#[case("PUBLISH")]
#[case("")]
fn unknown_or_miscased_tokens_are_rejected(#[case] token: &str) {
    assert_eq!(
        token.parse::<Command>(),
        Err(UnknownCommand(token.to_owned()))
    );
}

#[test]
fn every_command_round_trips_through_its_token() {
    let all = [
        Command::Connect,
        Command::Stomp,
        Command::Connected,
        Command::Send,
        Command::Subscribe,
        Command::Unsubscribe,
        Command::Ack,
        Command::Nack,
        Command::Begin,
        Command::Commit,
        Command::Abort,
        Command::Disconnect,
        Command::Message,
        Command::Receipt,
        Command::Error,
    ];
    for command in all {
        assert_eq!(command.as_str().parse::<Command>(), Ok(command));
    }
}

#[test]
fn header_lookup_sees_first_occurrence() {
    let mut headers = Headers::new();
    headers.push("foo", "first");
    headers.push("foo", "second");
    assert_eq!(headers.get("foo"), Some("first"));
    assert_eq!(headers.len(), 2);
}

#[test]
fn insert_replaces_all_occurrences() {
    let mut headers: Headers = [("id", "a"), ("id", "b"), ("ack", "client")]
        .into_iter()
        .collect();
    headers.insert("id", "c");
    assert_eq!(headers.get("id"), Some("c"));
    assert_eq!(headers.iter().filter(|(k, _)| *k == "id").count(), 1);
    assert_eq!(headers.remove("ack"), Some("client".to_owned()));
    assert!(!headers.contains("ack"));
}

#[test]
fn heartbeat_renders_as_bare_eol() {
    assert_eq!(Outbound::Heartbeat.into_text(), "\n");
    assert!(Outbound::Heartbeat.frame().is_none());
}

#[test]
fn reply_constructors_set_expected_headers() {
    let error = Frame::error("boom");
    assert_eq!(error.command(), Command::Error);
    assert_eq!(error.header("message"), Some("boom"));

    let receipt = Frame::receipt("77");
    assert_eq!(receipt.command(), Command::Receipt);
    assert_eq!(receipt.header("receipt-id"), Some("77"));
}
