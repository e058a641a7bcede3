//! SMTP connection management and session state machine.

mod client;
mod stream;

pub use client::Client;
pub use stream::{Connector, SmtpStream, TcpConnector, Transport};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;
use std::fmt;

/// Phase of an SMTP session.
///
/// ```text
/// Disconnected → Connected → Greeted ─┬─→ Authenticated ─→ RecipientSet ─→ SendingData
///                    ▲          │     │        ▲                               │
///                    │      STARTTLS  └────────┴───── (ready for next message) ◀┘
///                    │          ▼
///                    └─── TlsUpgraded
/// any state ── quit() / transport failure ──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No transport yet.
    Disconnected,
    /// Transport open, server greeting received.
    Connected,
    /// EHLO/HELO accepted.
    Greeted,
    /// STARTTLS handshake done, EHLO not yet repeated.
    TlsUpgraded,
    /// AUTH accepted.
    Authenticated,
    /// MAIL FROM and RCPT TO accepted; message is being composed.
    RecipientSet,
    /// DATA in progress.
    SendingData,
    /// Transport released. Terminal.
    Closed,
}

impl SessionState {
    /// Lower-case name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Greeted => "greeted",
            Self::TlsUpgraded => "tls-upgraded",
            Self::Authenticated => "authenticated",
            Self::RecipientSet => "recipient-set",
            Self::SendingData => "sending-data",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns true if EHLO listed `AUTH`, even with no mechanism this
    /// client knows.
    #[must_use]
    pub fn advertises_auth(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Returns the advertised mechanisms this client supports, in the
    /// server's order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
