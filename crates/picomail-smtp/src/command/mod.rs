//! SMTP command builder.
//!
//! Every command line the client sends is formatted here.

use std::borrow::Cow;

use crate::types::{Address, AuthMechanism};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a `334` challenge
    AuthResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Formats the command line, without the trailing CRLF.
    #[must_use]
    pub fn line(&self) -> String {
        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(resp),
            } => format!("AUTH {} {resp}", mechanism.as_str()),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse(resp) => resp.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }

    /// Returns the form of the command that is safe to log.
    ///
    /// Credentials are replaced by `<credentials>`.
    #[must_use]
    pub fn trace_label(&self) -> Cow<'_, str> {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => Cow::Owned(format!("AUTH {} <credentials>", mechanism.as_str())),
            Self::AuthResponse(_) => Cow::Borrowed("<credentials>"),
            other => Cow::Owned(other.line()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_commands() {
        let ehlo = Command::Ehlo {
            hostname: "sensor.local".to_string(),
        };
        assert_eq!(ehlo.line(), "EHLO sensor.local");
        let helo = Command::Helo {
            hostname: "sensor.local".to_string(),
        };
        assert_eq!(helo.line(), "HELO sensor.local");
    }

    #[test]
    fn test_auth_login() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(cmd.line(), "AUTH LOGIN");
    }

    #[test]
    fn test_auth_plain_is_redacted_in_trace() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.line(), "AUTH PLAIN AHVzZXIAcGFzcw==");
        assert_eq!(cmd.trace_label(), "AUTH PLAIN <credentials>");
    }

    #[test]
    fn test_auth_response_is_redacted_in_trace() {
        let cmd = Command::AuthResponse("dXNlcg==".to_string());
        assert_eq!(cmd.line(), "dXNlcg==");
        assert_eq!(cmd.trace_label(), "<credentials>");
    }

    #[test]
    fn test_envelope_commands() {
        let from = Command::MailFrom {
            from: Address::new("sensor@example.com").unwrap(),
        };
        assert_eq!(from.line(), "MAIL FROM:<sensor@example.com>");
        let to = Command::RcptTo {
            to: Address::new("5551234567@txt.example.net").unwrap(),
        };
        assert_eq!(to.line(), "RCPT TO:<5551234567@txt.example.net>");
        assert_eq!(to.trace_label(), "RCPT TO:<5551234567@txt.example.net>");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::StartTls.line(), "STARTTLS");
        assert_eq!(Command::Data.line(), "DATA");
        assert_eq!(Command::Rset.line(), "RSET");
        assert_eq!(Command::Quit.line(), "QUIT");
    }
}
