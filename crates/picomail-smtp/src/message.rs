//! Message-in-progress buffer and DATA payload encoding.
//!
//! Pure data shaping, no I/O. Header and body lines are kept in the order
//! they were written; MIME headers are injected on request at render time.

use std::borrow::Cow;

/// `MIME-Version` header injected by [`Message::compose`].
pub const MIME_VERSION_HEADER: &str = "MIME-Version: 1.0";
/// `Content-Type` header injected by [`Message::compose`].
pub const CONTENT_TYPE_HEADER: &str = "Content-Type: text/plain; charset=UTF-8";

/// Ordered header and body lines of the message being built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    lines: Vec<String>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text verbatim.
    ///
    /// Embedded newlines split the text into several lines when rendered.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Returns the raw buffered entries.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.lines
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drops everything written so far.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Renders the final message lines (no CRLF, no dot-stuffing).
    ///
    /// With `mime`, `MIME-Version` and `Content-Type` are placed ahead of the
    /// buffered headers unless the header block already has them. A blank
    /// line separates headers from `body` when the buffer has none yet.
    #[must_use]
    pub fn compose(&self, body: &str, mime: bool) -> Vec<String> {
        let mut lines: Vec<String> = self
            .lines
            .iter()
            .flat_map(|entry| split_lines(entry))
            .collect();

        let header_end = lines.iter().position(String::is_empty);
        let has_separator = header_end.is_some();

        if mime {
            let headers = &lines[..header_end.unwrap_or(lines.len())];
            let mut injected = Vec::with_capacity(2);
            if !has_header(headers, "MIME-Version") {
                injected.push(MIME_VERSION_HEADER.to_string());
            }
            if !has_header(headers, "Content-Type") {
                injected.push(CONTENT_TYPE_HEADER.to_string());
            }
            lines.splice(0..0, injected);
        }

        if !has_separator && (mime || !body.is_empty()) {
            lines.push(String::new());
        }
        if !body.is_empty() {
            lines.extend(split_lines(body));
        }
        lines
    }

    /// Encodes the DATA payload: CRLF line endings, dot-stuffing, and the
    /// terminating `.` line.
    #[must_use]
    pub fn payload(&self, body: &str, mime: bool) -> Vec<u8> {
        encode_data(&self.compose(body, mime))
    }
}

/// Encodes rendered lines for the DATA phase, terminator included.
#[must_use]
pub fn encode_data<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let size = lines.iter().map(|l| l.as_ref().len() + 3).sum::<usize>() + 3;
    let mut out = Vec::with_capacity(size);
    for line in lines {
        out.extend_from_slice(dot_stuff(line.as_ref()).as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Doubles a leading `.` so the line cannot end the DATA phase early.
#[must_use]
pub fn dot_stuff(line: &str) -> Cow<'_, str> {
    if line.starts_with('.') {
        Cow::Owned(format!(".{line}"))
    } else {
        Cow::Borrowed(line)
    }
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        // An explicit empty write is the header/body separator
        return vec![String::new()];
    }
    text.lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

fn has_header(headers: &[String], name: &str) -> bool {
    headers.iter().any(|line| {
        line.split_once(':')
            .is_some_and(|(field, _)| field.trim().eq_ignore_ascii_case(name))
    })
}
