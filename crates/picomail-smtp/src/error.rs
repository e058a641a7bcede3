//! Error types for SMTP operations.

use std::io;

use crate::connection::SessionState;
use crate::types::{ReplyClass, ReplyCode};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection could not be established (socket, handshake or greeting).
    #[error("Connection to {address} failed: {reason}")]
    Connection {
        /// `host:port` that was dialled.
        address: String,
        /// What went wrong.
        reason: String,
    },

    /// TLS negotiation failed. The connection is unusable afterwards.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error, including read and write timeouts.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server rejected an envelope command.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Server rejected the credentials or the AUTH exchange.
    #[error("Authentication failed ({code}): {message}")]
    Authentication {
        /// Reply code (e.g., 535).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Server rejected the message after the end-of-data marker.
    #[error("Message rejected ({code}): {message}")]
    Send {
        /// Reply code (e.g., 554).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Message exceeds the size the server announced with `SIZE`.
    #[error("Message is {size} bytes, server accepts at most {limit}")]
    MessageTooLarge {
        /// Encoded DATA payload size.
        size: usize,
        /// Advertised limit.
        limit: usize,
    },

    /// Operation called while the session is in the wrong state.
    #[error("{operation} is not allowed in the {state} state")]
    Sequence {
        /// Name of the rejected operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Transient failures persisted past the retry budget.
    #[error("Gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Creates a connection error for `address`.
    #[must_use]
    pub fn connection(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the server reply code carried by this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::SmtpError { code, .. }
            | Self::Authentication { code, .. }
            | Self::Send { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent server rejection (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self.reply_code(),
            Some(code) if matches!(ReplyCode::new(code).class(), ReplyClass::PermanentFailure)
        )
    }

    /// Returns true for transport failures: connection errors and I/O errors,
    /// timeouts included. Server replies of any status are not transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Io(_))
    }

    /// Returns true if this is a socket read or write timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
        )
    }
}
