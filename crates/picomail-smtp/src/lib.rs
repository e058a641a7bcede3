//! # picomail-smtp
//!
//! A small blocking SMTP submission client for devices that send one
//! message at a time over an unreliable link, either as email or as an SMS
//! through a carrier's email-to-SMS gateway.
//!
//! ## Features
//!
//! - **Session state machine**: out-of-order calls fail with
//!   [`Error::Sequence`] instead of confusing the server
//! - **TLS support**: implicit TLS (port 465) and STARTTLS, via rustls
//! - **Authentication**: AUTH LOGIN (default) and AUTH PLAIN
//! - **Retry**: the recipient step is retried with a fixed back-off on
//!   transient failures, re-establishing the session when the link dropped
//! - **Message composition**: line buffer with optional MIME headers and
//!   dot-stuffing
//!
//! ## Quick Start
//!
//! ```no_run
//! use picomail_smtp::{Client, ClientConfig, TlsMode};
//!
//! fn main() -> picomail_smtp::Result<()> {
//!     let config = ClientConfig::new("smtp.example.com", 587)
//!         .tls(TlsMode::StartTls)
//!         .credentials("sensor@example.com", "app-password");
//!
//!     let mut client = Client::open(config)?;
//!     client.to("5551234567@txt.example.net")?;
//!     client.write("Subject: Greenhouse")?;
//!     client.send("Temperature 21.5C, humidity 40%", true)?;
//!     client.quit();
//!     Ok(())
//! }
//! ```
//!
//! ## Tracing
//!
//! Each command/response pair is logged at `DEBUG` under the
//! `picomail_smtp::trace` target as `SMTP: <command> -> <code> <text>`.
//! Credentials never appear in the trace.
//!
//! ## Modules
//!
//! - [`command`]: SMTP command formatting
//! - [`connection`]: transport, connector and session state machine
//! - [`message`]: message buffer, MIME headers and dot-stuffing
//! - [`parser`]: response parser
//! - [`retry`]: bounded retry policy
//! - [`types`]: core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod config;
pub mod connection;
mod error;
pub mod message;
pub mod parser;
pub mod retry;
pub mod types;

pub use config::{
    ClientConfig, Credentials, DEFAULT_LOCAL_NAME, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    DEFAULT_TIMEOUT, TlsMode,
};
pub use connection::{
    Client, Connector, ServerInfo, SessionState, SmtpStream, TcpConnector, Transport,
};
pub use error::{Error, Result};
pub use message::Message;
pub use retry::{RetryPolicy, Sleeper};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyClass, ReplyCode};
