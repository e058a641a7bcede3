//! Scripted transports for driving the client without a network.
//!
//! A script is a list of server lines. Entries starting with `!` inject
//! failures instead:
//! - `!timeout` / `!reset`: the next read fails with that I/O error
//! - `!tls-fail`: the next STARTTLS handshake fails

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use picomail_smtp::{ClientConfig, Connector, Error, Result, Sleeper, TlsMode, Transport};

/// Everything the mock server observed, shared by all its connections.
#[derive(Debug, Default)]
pub struct WireLog {
    /// Raw bytes written by the client, across all connections.
    pub sent: Vec<u8>,
    /// Successful connector calls.
    pub connects: usize,
    /// Refused connector calls.
    pub refused: usize,
    /// TLS upgrades performed.
    pub upgrades: usize,
    /// Transports closed by the client.
    pub closes: usize,
}

/// Cloneable handle on a [`WireLog`].
#[derive(Debug, Clone, Default)]
pub struct Wire(Arc<Mutex<WireLog>>);

impl Wire {
    pub fn log(&self) -> std::sync::MutexGuard<'_, WireLog> {
        self.0.lock().unwrap()
    }

    /// Lines written by the client, CRLF removed.
    pub fn sent_lines(&self) -> Vec<String> {
        let log = self.log();
        let text = String::from_utf8_lossy(&log.sent);
        text.split_terminator("\r\n").map(str::to_string).collect()
    }

    /// Number of sent lines equal to `line`.
    pub fn count(&self, line: &str) -> usize {
        self.sent_lines().iter().filter(|l| *l == line).count()
    }

    /// Number of sent lines starting with `prefix`, ignoring ASCII case.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        let prefix = prefix.to_ascii_lowercase();
        self.sent_lines()
            .iter()
            .filter(|l| l.to_ascii_lowercase().starts_with(&prefix))
            .count()
    }
}

/// One scripted connection.
#[derive(Debug)]
pub struct MockTransport {
    script: VecDeque<String>,
    wire: Wire,
    closed: bool,
}

impl Transport for MockTransport {
    fn read_line(&mut self) -> Result<String> {
        if self.closed {
            return Err(Error::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        match self.script.pop_front().as_deref() {
            Some("!timeout") => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "read timed out",
            ))),
            Some("!reset") => Err(Error::Io(io::Error::from(
                io::ErrorKind::ConnectionReset,
            ))),
            Some(line) => Ok(line.to_string()),
            None => Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof))),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        self.wire.log().sent.extend_from_slice(data);
        Ok(())
    }

    fn upgrade_to_tls(&mut self, _server_name: &str) -> Result<()> {
        if self.script.front().map(String::as_str) == Some("!tls-fail") {
            self.script.pop_front();
            return Err(Error::Tls("handshake failure".into()));
        }
        self.wire.log().upgrades += 1;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.wire.log().closes += 1;
        }
    }
}

/// Connector handing out scripted connections in order.
///
/// Once the queue is empty every further connect is refused.
#[derive(Debug)]
pub struct MockConnector {
    sessions: VecDeque<Option<Vec<String>>>,
    wire: Wire,
}

impl MockConnector {
    pub fn new(wire: &Wire) -> Self {
        Self {
            sessions: VecDeque::new(),
            wire: wire.clone(),
        }
    }

    /// Queues a connection that accepts and plays `script`.
    #[must_use]
    pub fn session(mut self, script: &[&str]) -> Self {
        self.sessions
            .push_back(Some(script.iter().map(ToString::to_string).collect()));
        self
    }

    /// Queues a refused connection.
    #[must_use]
    pub fn refuse(mut self) -> Self {
        self.sessions.push_back(None);
        self
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        _timeout: Duration,
        _tls: TlsMode,
    ) -> Result<MockTransport> {
        match self.sessions.pop_front().flatten() {
            Some(script) => {
                self.wire.log().connects += 1;
                Ok(MockTransport {
                    script: script.into(),
                    wire: self.wire.clone(),
                    closed: false,
                })
            }
            None => {
                self.wire.log().refused += 1;
                Err(Error::connection(
                    format!("{host}:{port}"),
                    "connection refused",
                ))
            }
        }
    }
}

/// Sleeper that records requested delays instead of sleeping.
pub fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&delays);
    let sleeper: Sleeper = Arc::new(move |d: Duration| recorder.lock().unwrap().push(d));
    (sleeper, delays)
}

/// Plain-text configuration without credentials.
pub fn plain_config() -> ClientConfig {
    ClientConfig::new("mx.example.com", 25)
        .tls(TlsMode::None)
        .sender("sensor@example.com")
}

/// Greeting plus a successful EHLO.
pub const HELLO: &[&str] = &[
    "220 mx.example.com ESMTP ready",
    "250-mx.example.com Hello",
    "250-SIZE 1000",
    "250 OK",
];

/// Concatenates script fragments.
pub fn script(parts: &[&[&'static str]]) -> Vec<&'static str> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Routes client logs to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("picomail_smtp=debug")
        .with_test_writer()
        .try_init();
}
