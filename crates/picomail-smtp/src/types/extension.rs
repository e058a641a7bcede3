//! SMTP extension types.

use serde::{Deserialize, Serialize};

/// SMTP extensions discovered from the EHLO response.
///
/// Only the keywords this client acts on get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// Any other advertised keyword, kept verbatim
    Other(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Other(line.to_string());
        };

        // Some servers still send the pre-RFC "AUTH=LOGIN PLAIN" form
        let (keyword, inline_arg) = match keyword.split_once('=') {
            Some((kw, arg)) => (kw.to_uppercase(), Some(arg)),
            None => (keyword.to_uppercase(), None),
        };

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(
                inline_arg
                    .into_iter()
                    .chain(parts)
                    .filter_map(AuthMechanism::parse)
                    .collect(),
            ),
            "SIZE" => Self::Size(parts.next().and_then(|s| s.parse().ok())),
            _ => Self::Other(line.to_string()),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMechanism {
    /// LOGIN - username and password in two challenge rounds
    #[default]
    Login,
    /// PLAIN - `\0user\0password` in one initial response
    Plain,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}
