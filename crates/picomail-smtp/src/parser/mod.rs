//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One parsed line of a (possibly multi-line) reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// Three-digit status code.
    pub code: u16,
    /// True for the final line (`250 ` or a bare `250`).
    pub is_last: bool,
    /// Text after the separator.
    pub text: &'a str,
}

/// Parses a single reply line.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line does not start with three digits
/// or the separator is neither `-` nor a space.
pub fn parse_line(line: &str) -> Result<ReplyLine<'_>> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("Invalid reply line: {line:?}")));
    }

    let code = u16::from(bytes[0] - b'0') * 100
        + u16::from(bytes[1] - b'0') * 10
        + u16::from(bytes[2] - b'0');

    match bytes.get(3) {
        None => Ok(ReplyLine {
            code,
            is_last: true,
            text: "",
        }),
        Some(b' ') => Ok(ReplyLine {
            code,
            is_last: true,
            text: line[4..].trim_end(),
        }),
        Some(b'-') => Ok(ReplyLine {
            code,
            is_last: false,
            text: line[4..].trim_end(),
        }),
        Some(_) => Err(Error::Protocol(format!("Malformed reply line: {line:?}"))),
    }
}

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns an error if any line is malformed, the lines disagree on the
/// code, or the last line is a continuation line.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some((last, _)) = lines.split_last() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let mut code = None;
    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        let parsed = parse_line(line)?;
        match code {
            None => code = Some(parsed.code),
            Some(first) if first != parsed.code => {
                return Err(Error::Protocol(format!(
                    "Reply code changed from {first} to {} mid-reply",
                    parsed.code
                )));
            }
            Some(_) => {}
        }
        message.push(parsed.text.to_string());
    }

    if !is_last_reply_line(last) {
        return Err(Error::Protocol("Reply ended on a continuation line".into()));
    }

    let code = code.map_or(ReplyCode::new(0), ReplyCode::new);
    Ok(Reply::new(code, message))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        None => line.len() == 3,
        Some(sep) => *sep == b' ',
    }
}
