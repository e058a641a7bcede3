//! Server replies and their status codes.

use std::fmt;

/// One complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code shared by every line.
    pub code: ReplyCode,
    /// Text of each line, code and separator stripped.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// True for 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Completed)
    }

    /// True if the reply carries exactly `code`.
    #[must_use]
    pub fn is(&self, code: ReplyCode) -> bool {
        self.code == code
    }

    /// Non-empty line texts joined by single spaces.
    #[must_use]
    pub fn message_text(&self) -> String {
        let parts: Vec<&str> = self
            .message
            .iter()
            .map(String::as_str)
            .filter(|text| !text.is_empty())
            .collect();
        parts.join(" ")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message_text())
    }
}

/// First digit of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2xx: the command was carried out.
    Completed,
    /// 3xx: more input is expected (AUTH challenge, DATA).
    Intermediate,
    /// 4xx: refused for now; the same command may work later.
    TransientFailure,
    /// 5xx: refused for good.
    PermanentFailure,
    /// Anything outside 200..=599.
    Unknown,
}

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// `220` greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// `250` requested action completed.
    pub const OK: Self = Self(250);
    /// `334` AUTH challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// `354` go ahead with the message.
    pub const START_DATA: Self = Self(354);
    /// `503` bad sequence of commands.
    pub const BAD_SEQUENCE: Self = Self(503);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Classifies the code by its first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            5 => ReplyClass::PermanentFailure,
            _ => ReplyClass::Unknown,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(ReplyCode::new(235).class(), ReplyClass::Completed);
        assert_eq!(ReplyCode::START_DATA.class(), ReplyClass::Intermediate);
        assert_eq!(ReplyCode::new(451).class(), ReplyClass::TransientFailure);
        assert_eq!(ReplyCode::new(550).class(), ReplyClass::PermanentFailure);
        assert_eq!(ReplyCode::new(0).class(), ReplyClass::Unknown);
        assert_eq!(ReplyCode::new(600).class(), ReplyClass::Unknown);
    }

    #[test]
    fn display_joins_lines() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec!["Hello".into(), "SIZE 1000".into(), "OK".into()],
        );
        assert_eq!(reply.to_string(), "250 Hello SIZE 1000 OK");
    }

    #[test]
    fn message_text_skips_empty_lines() {
        let reply = Reply::new(ReplyCode::OK, vec![String::new(), "OK".into()]);
        assert_eq!(reply.message_text(), "OK");
        assert_eq!(Reply::new(ReplyCode::OK, vec![]).message_text(), "");
    }

    #[test]
    fn exact_code_match() {
        let reply = Reply::new(ReplyCode::START_DATA, vec!["Go ahead".into()]);
        assert!(reply.is(ReplyCode::START_DATA));
        assert!(!reply.is(ReplyCode::OK));
        assert!(!reply.is_success());
    }
}
