//! Recipient-step retry and session recovery.

mod support;

use std::time::Duration;

use picomail_smtp::{Client, Error, SessionState};

use support::{HELLO, MockConnector, Wire, init_tracing, plain_config, recording_sleeper, script};

#[test]
fn timeout_then_reconnect_succeeds() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, delays) = recording_sleeper();
    let connector = MockConnector::new(&wire)
        .session(&script(&[HELLO, &["!timeout"]]))
        .refuse()
        .session(&script(&[HELLO, &["250 OK", "250 OK"]]));
    let mut client = Client::with_connector(plain_config(), connector).with_sleeper(sleeper);
    client.establish().unwrap();

    client.to("ops@example.com").unwrap();
    assert_eq!(client.state(), SessionState::RecipientSet);

    // Timed out, refused, then accepted
    assert_eq!(*delays.lock().unwrap(), vec![Duration::from_secs(5); 2]);
    let log = wire.log();
    assert_eq!(log.connects, 2);
    assert_eq!(log.refused, 1);
    assert_eq!(log.closes, 1);
    drop(log);
    assert_eq!(wire.count("MAIL FROM:<sensor@example.com>"), 2);
    assert_eq!(wire.count("EHLO localhost"), 2);
}

#[test]
fn gives_up_after_retry_budget() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, delays) = recording_sleeper();
    let connector = MockConnector::new(&wire)
        .session(&script(&[HELLO, &["!reset"]]))
        .refuse()
        .refuse()
        .refuse();
    let mut client = Client::with_connector(plain_config(), connector).with_sleeper(sleeper);
    client.establish().unwrap();

    let err = client.to("ops@example.com").unwrap_err();
    match err {
        Error::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, Error::Connection { .. }));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }

    assert_eq!(delays.lock().unwrap().len(), 3);
    assert_eq!(wire.log().refused, 3);
    assert!(!client.is_connected());
    assert_eq!(client.state(), SessionState::Closed);
}

#[test]
fn exhausted_session_stays_closed() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, _delays) = recording_sleeper();
    let connector = MockConnector::new(&wire)
        .session(&script(&[HELLO, &["!reset"]]))
        .refuse()
        .refuse()
        .refuse()
        .session(HELLO);
    let mut client = Client::with_connector(plain_config(), connector).with_sleeper(sleeper);
    client.establish().unwrap();

    assert!(matches!(
        client.to("ops@example.com"),
        Err(Error::RetryExhausted { .. })
    ));
    assert_eq!(client.state(), SessionState::Closed);

    // The queued good session is never used
    assert!(matches!(
        client.connect(),
        Err(Error::Sequence {
            operation: "connect",
            state: SessionState::Closed
        })
    ));
    assert!(matches!(
        client.to("ops@example.com"),
        Err(Error::Sequence { .. })
    ));
    assert_eq!(wire.log().connects, 1);
}

#[test]
fn zero_retries_fails_on_first_transient_error() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, delays) = recording_sleeper();
    let connector = MockConnector::new(&wire).session(&script(&[HELLO, &["!timeout"]]));
    let mut client = Client::with_connector(plain_config().max_retries(0), connector)
        .with_sleeper(sleeper);
    client.establish().unwrap();

    let err = client.to("ops@example.com").unwrap_err();
    assert!(matches!(err, Error::RetryExhausted { attempts: 1, .. }));
    assert!(delays.lock().unwrap().is_empty());
    assert_eq!(client.state(), SessionState::Closed);
}

#[test]
fn temporary_rcpt_reply_is_not_retried() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, delays) = recording_sleeper();
    let connector = MockConnector::new(&wire).session(&script(&[
        HELLO,
        &["250 OK", "450 4.2.1 Mailbox busy", "250 Flushed"],
    ]));
    let mut client = Client::with_connector(plain_config(), connector).with_sleeper(sleeper);
    client.establish().unwrap();

    let err = client.to("ops@example.com").unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 450, .. }));
    assert!(!err.is_transient());
    assert!(delays.lock().unwrap().is_empty());
    assert_eq!(wire.count("RCPT TO:<ops@example.com>"), 1);
    assert_eq!(wire.count("RSET"), 1);
    assert_eq!(client.state(), SessionState::Greeted);
}

#[test]
fn temporary_mail_from_reply_is_not_retried() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, delays) = recording_sleeper();
    let connector = MockConnector::new(&wire)
        .session(&script(&[HELLO, &["421 4.3.2 Shutting down"]]));
    let mut client = Client::with_connector(plain_config(), connector).with_sleeper(sleeper);
    client.establish().unwrap();

    assert!(matches!(
        client.to("ops@example.com"),
        Err(Error::SmtpError { code: 421, .. })
    ));
    assert!(delays.lock().unwrap().is_empty());
    assert_eq!(wire.count_prefix("MAIL FROM"), 1);
}

#[test]
fn retry_recovers_whole_session_with_auth() {
    init_tracing();
    let wire = Wire::default();
    let (sleeper, _delays) = recording_sleeper();
    let login: &[&str] = &[
        "334 VXNlcm5hbWU6",
        "334 UGFzc3dvcmQ6",
        "235 2.7.0 Accepted",
    ];
    let connector = MockConnector::new(&wire)
        .session(&script(&[HELLO, login, &["!reset"]]))
        .session(&script(&[HELLO, login, &["250 OK", "250 OK"]]));
    let config = plain_config().credentials("sensor@example.com", "secret");
    let mut client = Client::with_connector(config, connector).with_sleeper(sleeper);
    client.establish().unwrap();

    client.to("ops@example.com").unwrap();
    assert_eq!(client.state(), SessionState::RecipientSet);
    assert_eq!(wire.count("AUTH LOGIN"), 2);
}
