//! Envelope address type.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Email address for the SMTP envelope (`MAIL FROM` / `RCPT TO`).
///
/// Email-to-SMS gateway addresses such as `5551234567@vtext.example` are
/// ordinary addresses here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Parses an envelope address. Surrounding whitespace and one pair of
    /// angle brackets are stripped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] unless the result is `local@domain`
    /// with no whitespace, control characters or angle brackets.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let trimmed = addr.trim();
        let trimmed = trimmed
            .strip_prefix('<')
            .and_then(|a| a.strip_suffix('>'))
            .unwrap_or(trimmed);
        Self::validate(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        problem(addr).map_or(Ok(()), |reason| {
            Err(Error::InvalidAddress(format!("{addr:?}: {reason}")))
        })
    }
}

/// Why `addr` cannot be used on a command line, if it cannot.
fn problem(addr: &str) -> Option<&'static str> {
    if addr.is_empty() {
        return Some("empty address");
    }
    // Anything here ends up verbatim after MAIL FROM: / RCPT TO:
    if addr
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '<' | '>'))
    {
        return Some("forbidden character");
    }
    match addr.split_once('@') {
        None => Some("missing @"),
        Some((_, domain)) if domain.contains('@') => Some("more than one @"),
        Some((local, domain)) if local.is_empty() || domain.is_empty() => {
            Some("empty local part or domain")
        }
        Some(_) => None,
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
