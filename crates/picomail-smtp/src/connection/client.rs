//! Session state machine driving one SMTP connection.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info, warn};

use super::stream::{Connector, TcpConnector, Transport};
use super::{ServerInfo, SessionState};
use crate::command::Command;
use crate::config::{ClientConfig, Credentials, TlsMode};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::retry::{Sleeper, thread_sleeper};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};

/// Target carrying one line per command/response exchange.
const TRACE_TARGET: &str = "picomail_smtp::trace";

/// SMTP client session.
///
/// Owns at most one transport at a time and closes it on [`Client::quit`],
/// on transport failure, or when dropped. Every operation checks the
/// current [`SessionState`] and fails with [`Error::Sequence`] when called
/// out of order.
pub struct Client<C: Connector = TcpConnector> {
    config: ClientConfig,
    connector: C,
    transport: Option<C::Transport>,
    state: SessionState,
    server_info: ServerInfo,
    message: Message,
    sleeper: Sleeper,
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("server_info", &self.server_info)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl Client<TcpConnector> {
    /// Creates a disconnected client that dials real TCP sockets.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }

    /// Creates a client and runs connect, greet, STARTTLS and AUTH as the
    /// configuration asks.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`Client::establish`].
    pub fn open(config: ClientConfig) -> Result<Self> {
        let mut client = Self::new(config);
        client.establish()?;
        Ok(client)
    }
}

impl<C: Connector> Client<C> {
    /// Creates a disconnected client using `connector` to open transports.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            transport: None,
            state: SessionState::Disconnected,
            server_info: ServerInfo::default(),
            message: Message::new(),
            sleeper: thread_sleeper(),
        }
    }

    /// Replaces the function used to wait between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Current session phase.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while a transport is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Capabilities reported by the server.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Message composed so far in the current transaction.
    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    /// Runs every setup step the configuration calls for: connect, greet,
    /// STARTTLS (in [`TlsMode::StartTls`]) and AUTH (with credentials).
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that fails.
    pub fn establish(&mut self) -> Result<()> {
        self.connect()?;
        self.greet()?;
        if self.config.tls == TlsMode::StartTls {
            self.starttls()?;
        }
        if self.config.credentials.is_some() {
            self.authenticate()?;
        }
        Ok(())
    }

    /// Opens the transport and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unusable configuration and
    /// [`Error::Connection`] if the socket, the implicit TLS handshake or
    /// the `220` greeting fails.
    pub fn connect(&mut self) -> Result<()> {
        self.expect_state("connect", &[SessionState::Disconnected])?;
        self.config.validate()?;

        let address = self.config.address();
        let transport = self
            .connector
            .connect(
                &self.config.host,
                self.config.port,
                self.config.timeout,
                self.config.tls,
            )
            .map_err(|e| match e {
                Error::Connection { .. } => e,
                other => Error::connection(&address, other),
            })?;
        self.transport = Some(transport);
        self.state = SessionState::Connected;

        let greeting = match self.read_reply("<greeting>") {
            Ok(reply) => reply,
            Err(e) => {
                self.abort_connect();
                return Err(Error::connection(address, e));
            }
        };
        if !greeting.is(ReplyCode::SERVICE_READY) {
            self.abort_connect();
            return Err(Error::connection(
                address,
                format!("server greeting: {greeting}"),
            ));
        }

        self.server_info = ServerInfo {
            hostname: greeting
                .message
                .first()
                .and_then(|msg| msg.split_whitespace().next())
                .unwrap_or("unknown")
                .to_string(),
            extensions: HashSet::new(),
        };
        info!(
            %address,
            tls = %self.config.tls,
            server = %self.server_info.hostname,
            "Connected to SMTP server"
        );
        Ok(())
    }

    /// Sends EHLO, falling back to HELO once if EHLO is refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if both greetings are refused.
    pub fn greet(&mut self) -> Result<()> {
        self.expect_state(
            "greet",
            &[SessionState::Connected, SessionState::TlsUpgraded],
        )?;
        let hostname = self.config.local_name.clone();

        let ehlo = self.execute(&Command::Ehlo {
            hostname: hostname.clone(),
        })?;
        let extensions = if ehlo.is_success() {
            // First line is the server's greeting, not a keyword
            ehlo.message
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect()
        } else {
            debug!(reply = %ehlo, "EHLO refused, falling back to HELO");
            let helo = self.execute(&Command::Helo { hostname })?;
            if !helo.is_success() {
                return Err(Error::Protocol(format!(
                    "Server refused EHLO ({ehlo}) and HELO ({helo})"
                )));
            }
            HashSet::new()
        };

        self.server_info.extensions = extensions;
        self.state = SessionState::Greeted;
        Ok(())
    }

    /// Upgrades the session with STARTTLS and repeats the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the client is configured for
    /// [`TlsMode::StartTls`], and [`Error::Tls`] if the server refuses or
    /// the handshake fails. A failed handshake closes the session.
    pub fn starttls(&mut self) -> Result<()> {
        self.expect_state("starttls", &[SessionState::Greeted])?;
        if self.config.tls != TlsMode::StartTls {
            return Err(Error::Config(format!(
                "STARTTLS requested but TLS mode is {}",
                self.config.tls
            )));
        }
        if !self.server_info.supports_starttls() {
            warn!("Server did not advertise STARTTLS, trying anyway");
        }

        let reply = self.execute(&Command::StartTls)?;
        if !reply.is_success() {
            return Err(Error::Tls(format!("STARTTLS refused: {reply}")));
        }

        let server_name = self.config.host.clone();
        let upgraded = match self.transport.as_mut() {
            Some(transport) => transport.upgrade_to_tls(&server_name),
            None => Err(not_connected()),
        };
        if let Err(e) = upgraded {
            self.fail_transport();
            return Err(match e {
                Error::Tls(_) => e,
                other => Error::Tls(other.to_string()),
            });
        }
        debug!("STARTTLS upgrade complete");
        self.state = SessionState::TlsUpgraded;

        // Extension state is reset by the upgrade
        self.server_info.extensions.clear();
        self.greet()
    }

    /// Authenticates with the configured credentials and mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without credentials or when the server
    /// offers no supported mechanism, and [`Error::Authentication`] on any
    /// unexpected reply during the exchange.
    pub fn authenticate(&mut self) -> Result<()> {
        self.expect_state("authenticate", &[SessionState::Greeted])?;
        let credentials = self
            .config
            .credentials
            .clone()
            .ok_or_else(|| Error::Config("no credentials configured".into()))?;

        let reply = match self.choose_mechanism()? {
            AuthMechanism::Login => self.auth_login(&credentials)?,
            AuthMechanism::Plain => self.auth_plain(&credentials)?,
        };

        if reply.is(ReplyCode::BAD_SEQUENCE) {
            warn!("Server reports the session is already authenticated");
        } else if !reply.is_success() {
            return Err(auth_error(&reply));
        }

        info!(username = %credentials.username, "Authenticated");
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Picks the configured mechanism if the server offers it, otherwise
    /// another offered one (PLAIN first). Without an `AUTH` line in EHLO the
    /// configured mechanism is tried as is.
    fn choose_mechanism(&self) -> Result<AuthMechanism> {
        let preferred = self.config.auth_mechanism;
        if !self.server_info.advertises_auth() {
            warn!(
                mechanism = preferred.as_str(),
                "Server did not advertise AUTH, trying anyway"
            );
            return Ok(preferred);
        }

        let offered = self.server_info.auth_mechanisms();
        if offered.contains(&preferred) {
            return Ok(preferred);
        }
        let fallback = [AuthMechanism::Plain, AuthMechanism::Login]
            .into_iter()
            .find(|m| offered.contains(m))
            .ok_or_else(|| {
                Error::Config("server offers no supported AUTH mechanism (PLAIN, LOGIN)".into())
            })?;
        debug!(
            configured = preferred.as_str(),
            using = fallback.as_str(),
            "Configured AUTH mechanism not offered"
        );
        Ok(fallback)
    }

    fn auth_login(&mut self, credentials: &Credentials) -> Result<Reply> {
        let reply = self.execute(&Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        })?;
        if !reply.is(ReplyCode::AUTH_CONTINUE) {
            return Err(auth_error(&reply));
        }

        let reply = self.execute(&Command::AuthResponse(
            BASE64.encode(credentials.username.as_bytes()),
        ))?;
        if !reply.is(ReplyCode::AUTH_CONTINUE) {
            return Err(auth_error(&reply));
        }

        self.execute(&Command::AuthResponse(
            BASE64.encode(credentials.password.as_bytes()),
        ))
    }

    fn auth_plain(&mut self, credentials: &Credentials) -> Result<Reply> {
        let token = format!("\0{}\0{}", credentials.username, credentials.password);
        self.execute(&Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(BASE64.encode(token.as_bytes())),
        })
    }

    /// Starts a new message to `recipient` (`MAIL FROM` then `RCPT TO`).
    ///
    /// Transport failures (connection, I/O, timeout) are retried according
    /// to the configured retry policy, re-establishing the session before
    /// each new attempt. Server replies are never retried.
    /// A message still being composed is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] before the session is ready,
    /// [`Error::InvalidAddress`] for a malformed recipient,
    /// [`Error::SmtpError`] if the server rejects the envelope,
    /// and [`Error::RetryExhausted`] once transient failures outlast the
    /// retry budget.
    pub fn to(&mut self, recipient: &str) -> Result<()> {
        if !self.is_ready() && self.state != SessionState::RecipientSet {
            return Err(self.sequence_error("to"));
        }
        let recipient = Address::new(recipient)?;
        let sender = self.config.sender_address()?;

        if self.state == SessionState::RecipientSet {
            debug!("Discarding unsent message");
            self.reset_transaction();
        }
        self.message.clear();

        let policy = self.config.retry_policy();
        let sleeper = Arc::clone(&self.sleeper);
        let result = policy.run(
            |attempt| {
                if attempt > 1 {
                    self.recover()?;
                }
                self.start_transaction(&sender, &recipient)
            },
            &*sleeper,
        );

        match result {
            Ok(()) => {
                debug!(%recipient, "Recipient accepted");
                self.state = SessionState::RecipientSet;
                Ok(())
            }
            Err(e) => {
                warn!(%recipient, error = %e, "Recipient step failed");
                Err(e)
            }
        }
    }

    /// Appends a header or body line to the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] unless a recipient has been set.
    pub fn write(&mut self, line: impl Into<String>) -> Result<()> {
        self.expect_state("write", &[SessionState::RecipientSet])?;
        self.message.push(line);
        Ok(())
    }

    /// Transmits the composed message followed by `body`.
    ///
    /// With `mime`, `MIME-Version` and a UTF-8 `text/plain` `Content-Type`
    /// are added unless already present. On return the session is ready
    /// for the next [`Client::to`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] before [`Client::to`],
    /// [`Error::MessageTooLarge`] if the payload exceeds the server's
    /// `SIZE`, [`Error::Protocol`] if DATA is not answered with `354`, and
    /// [`Error::Send`] if the server rejects the message.
    pub fn send(&mut self, body: &str, mime: bool) -> Result<()> {
        self.expect_state("send", &[SessionState::RecipientSet])?;
        let payload = self.message.payload(body, mime);
        self.message.clear();

        if let Some(limit) = self.server_info.max_message_size()
            && limit > 0
            && payload.len() > limit
        {
            self.reset_transaction();
            self.return_to_ready();
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                limit,
            });
        }
        self.state = SessionState::SendingData;

        let reply = self.execute(&Command::Data)?;
        if !reply.is(ReplyCode::START_DATA) {
            self.reset_transaction();
            self.return_to_ready();
            return Err(Error::Protocol(format!("DATA refused: {reply}")));
        }

        let label = format!("<message, {} bytes>", payload.len());
        let written = match self.transport.as_mut() {
            Some(transport) => transport.write_all(&payload),
            None => Err(not_connected()),
        };
        let reply = match written.and_then(|()| self.read_reply(&label)) {
            Ok(reply) => reply,
            Err(e) => {
                self.fail_transport();
                return Err(e);
            }
        };

        self.return_to_ready();
        if !reply.is_success() {
            return Err(Error::Send {
                code: reply.code.as_u16(),
                message: reply.message_text(),
            });
        }
        info!(reply = %reply, "Message accepted");
        Ok(())
    }

    /// Sends QUIT, ignoring the reply, and closes the transport.
    ///
    /// Calling it again, or before connecting, only marks the session
    /// closed.
    pub fn quit(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.transport.is_some() {
            match self.execute(&Command::Quit) {
                Ok(reply) if !reply.is_success() => warn!(%reply, "QUIT refused"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "QUIT failed"),
            }
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.message.clear();
        self.state = SessionState::Closed;
        debug!("Session closed");
    }

    /// Sends one command and reads its reply.
    ///
    /// Any transport or framing error closes the session.
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let result = match self.transport.as_mut() {
            Some(transport) => transport
                .write_line(&command.line())
                .and_then(|()| transport.read_response()),
            None => Err(not_connected()),
        };

        match result {
            Ok(reply) => {
                trace_exchange(&command.trace_label(), &reply);
                Ok(reply)
            }
            Err(e) => {
                debug!(target: TRACE_TARGET, "SMTP: {} -> {}", command.trace_label(), e);
                self.fail_transport();
                Err(e)
            }
        }
    }

    /// Reads a reply that was not prompted by a command line.
    fn read_reply(&mut self, label: &str) -> Result<Reply> {
        let reply = match self.transport.as_mut() {
            Some(transport) => transport.read_response()?,
            None => return Err(not_connected()),
        };
        trace_exchange(label, &reply);
        Ok(reply)
    }

    fn start_transaction(&mut self, sender: &Address, recipient: &Address) -> Result<()> {
        let reply = self.execute(&Command::MailFrom {
            from: sender.clone(),
        })?;
        if !reply.is_success() {
            return Err(envelope_error(&reply));
        }

        let reply = self.execute(&Command::RcptTo {
            to: recipient.clone(),
        })?;
        if !reply.is_success() {
            self.reset_transaction();
            return Err(envelope_error(&reply));
        }
        Ok(())
    }

    /// Re-establishes a session whose transport was lost.
    ///
    /// A failed attempt leaves the session `Closed`; only the next retry
    /// attempt reopens it.
    fn recover(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }
        info!("Re-establishing SMTP session");
        self.state = SessionState::Disconnected;
        self.server_info = ServerInfo::default();
        if let Err(e) = self.establish() {
            self.fail_transport();
            return Err(e);
        }
        Ok(())
    }

    /// Best-effort RSET.
    fn reset_transaction(&mut self) {
        if self.transport.is_none() {
            return;
        }
        match self.execute(&Command::Rset) {
            Ok(reply) if !reply.is_success() => warn!(%reply, "RSET refused"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "RSET failed"),
        }
    }

    fn fail_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            warn!(state = %self.state, "Closing SMTP transport after failure");
            transport.close();
        }
        self.state = SessionState::Closed;
    }

    /// Drops a transport whose greeting failed; `connect` may be retried.
    fn abort_connect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.state = SessionState::Disconnected;
    }

    fn is_ready(&self) -> bool {
        match self.state {
            SessionState::Authenticated => true,
            SessionState::Greeted => self.config.credentials.is_none(),
            _ => false,
        }
    }

    fn return_to_ready(&mut self) {
        if self.transport.is_none() {
            return;
        }
        self.state = if self.config.credentials.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Greeted
        };
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.sequence_error(operation))
        }
    }

    const fn sequence_error(&self, operation: &'static str) -> Error {
        Error::Sequence {
            operation,
            state: self.state,
        }
    }
}

impl<C: Connector> Drop for Client<C> {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

fn trace_exchange(label: &str, reply: &Reply) {
    debug!(
        target: TRACE_TARGET,
        "SMTP: {} -> {} {}",
        label,
        reply.code,
        reply.message_text()
    );
}

fn envelope_error(reply: &Reply) -> Error {
    Error::smtp_error(reply.code.as_u16(), reply.message_text())
}

fn auth_error(reply: &Reply) -> Error {
    Error::Authentication {
        code: reply.code.as_u16(),
        message: reply.message_text(),
    }
}

fn not_connected() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "no open transport",
    ))
}
