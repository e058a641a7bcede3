//! Low-level SMTP stream handling.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig as TlsConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::debug;

use crate::config::TlsMode;
use crate::error::{Error, Result};
use crate::parser::{parse_line, parse_reply};
use crate::types::Reply;

/// Upper bound on lines in one reply; a server exceeding it is broken.
const MAX_REPLY_LINES: usize = 256;
/// Longest reply line accepted, CRLF included (RFC 5321 4.5.3.1.5).
const MAX_LINE_BYTES: usize = 512;

/// Line-oriented byte stream to an SMTP server.
///
/// Implementors provide the raw primitives; framing of commands and
/// replies is layered on top by the provided methods.
pub trait Transport {
    /// Reads one line, without its CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on timeout, reset or end of stream.
    fn read_line(&mut self) -> Result<String>;

    /// Writes all bytes and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on a failed or partial write.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Performs a TLS handshake over the open plaintext connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if negotiation fails. The transport is unusable
    /// afterwards.
    fn upgrade_to_tls(&mut self, server_name: &str) -> Result<()>;

    /// Best-effort shutdown. Never fails, also on a closed transport.
    fn close(&mut self);

    /// Writes `line` followed by CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on a failed or partial write.
    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.write_all(&buf)
    }

    /// Reads one complete, possibly multi-line, reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails and [`Error::Protocol`] if a
    /// line does not start with a three-digit code.
    fn read_response(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let is_last = parse_line(&line)?.is_last;
            lines.push(line);
            if is_last {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(Error::Protocol(format!(
                    "Reply longer than {MAX_REPLY_LINES} lines"
                )));
            }
        }
        parse_reply(&lines)
    }
}

/// Opens transports for a [`Client`](crate::Client).
pub trait Connector {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Opens a connection, completing the TLS handshake first when `tls` is
    /// [`TlsMode::Implicit`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the socket cannot be opened or the
    /// handshake fails within `timeout`.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
        tls: TlsMode,
    ) -> Result<Self::Transport>;
}

/// Connector dialling real TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Transport = SmtpStream;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
        tls: TlsMode,
    ) -> Result<SmtpStream> {
        let mut stream = SmtpStream::connect(host, port, timeout)?;
        if tls != TlsMode::Implicit {
            return Ok(stream);
        }

        stream
            .upgrade_to_tls(host)
            .map_err(|e| Error::connection(format!("{host}:{port}"), e))?;
        Ok(stream)
    }
}

/// SMTP stream (TCP or TLS).
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<StreamOwned<ClientConnection, TcpStream>>>),
    /// Shut down or lost mid-upgrade.
    Closed,
}

impl fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(reader) => f.debug_tuple("Tcp").field(reader.get_ref()).finish(),
            Self::Tls(reader) => f.debug_tuple("Tls").field(&reader.get_ref().sock).finish(),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

impl SmtpStream {
    /// Connects to an SMTP server over plain TCP.
    ///
    /// Every resolved address is tried in turn; `timeout` bounds each
    /// connect attempt and every later read and write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if no address accepts the connection.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{host}:{port}");
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::connection(&address, format!("name resolution failed: {e}")))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => {
                    debug!(%addr, "TCP connection established");
                    configure_socket(&tcp, timeout)
                        .map_err(|e| Error::connection(&address, e))?;
                    return Ok(Self::Tcp(BufReader::new(tcp)));
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::connection(
            address,
            last_error.map_or_else(|| "no addresses resolved".to_string(), |e| e.to_string()),
        ))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Transport for SmtpStream {
    fn read_line(&mut self) -> Result<String> {
        match self {
            Self::Tcp(reader) => read_capped_line(reader),
            Self::Tls(reader) => read_capped_line(&mut **reader),
            Self::Closed => Err(not_connected()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data)?;
                reader.get_mut().flush()?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data)?;
                reader.get_mut().flush()?;
            }
            Self::Closed => return Err(not_connected()),
        }
        Ok(())
    }

    fn upgrade_to_tls(&mut self, server_name: &str) -> Result<()> {
        let reader = match std::mem::replace(self, Self::Closed) {
            Self::Tcp(reader) => reader,
            Self::Tls(reader) => {
                *self = Self::Tls(reader);
                return Err(Error::Tls("Already using TLS".into()));
            }
            Self::Closed => return Err(not_connected()),
        };

        // Bytes buffered before the handshake were never protected
        if !reader.buffer().is_empty() {
            return Err(Error::Tls(
                "Server sent data before the TLS handshake".into(),
            ));
        }

        let tls = handshake(reader.into_inner(), server_name)?;
        debug!(server_name, "TLS handshake complete");
        *self = Self::Tls(Box::new(BufReader::new(tls)));
        Ok(())
    }

    fn close(&mut self) {
        match std::mem::replace(self, Self::Closed) {
            Self::Tcp(reader) => {
                let _ = reader.get_ref().shutdown(Shutdown::Both);
            }
            Self::Tls(mut reader) => {
                let stream = reader.get_mut();
                stream.conn.send_close_notify();
                let _ = stream.flush();
                let _ = stream.sock.shutdown(Shutdown::Both);
            }
            Self::Closed => {}
        }
    }
}

/// Reads one line of at most [`MAX_LINE_BYTES`], without its CRLF.
fn read_capped_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = Read::take(reader, MAX_LINE_BYTES as u64).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if n >= MAX_LINE_BYTES && !buf.ends_with(b"\n") {
        return Err(Error::Protocol(format!(
            "Reply line longer than {MAX_LINE_BYTES} bytes"
        )));
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn configure_socket(tcp: &TcpStream, timeout: Duration) -> io::Result<()> {
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;
    tcp.set_nodelay(true)
}

fn not_connected() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "transport is closed",
    ))
}

/// Runs the TLS client handshake to completion on `tcp`.
fn handshake(
    tcp: TcpStream,
    server_name: &str,
) -> Result<StreamOwned<ClientConnection, TcpStream>> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|_| Error::Tls(format!("Invalid hostname: {server_name}")))?;

    let conn = ClientConnection::new(create_tls_config(), name)
        .map_err(|e| Error::Tls(e.to_string()))?;
    let mut stream = StreamOwned::new(conn, tcp);

    while stream.conn.is_handshaking() {
        let (read, written) = stream
            .conn
            .complete_io(&mut stream.sock)
            .map_err(|e| Error::Tls(format!("Handshake failed: {e}")))?;
        if read == 0 && written == 0 && stream.conn.is_handshaking() {
            return Err(Error::Tls("Connection closed during handshake".into()));
        }
    }
    Ok(stream)
}

/// Creates a TLS client configuration with the webpki root certificates.
fn create_tls_config() -> Arc<TlsConfig> {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = TlsConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport replaying canned lines.
    struct Lines(VecDeque<&'static str>);

    impl Transport for Lines {
        fn read_line(&mut self) -> Result<String> {
            self.0
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| Error::Io(io::Error::from(io::ErrorKind::TimedOut)))
        }

        fn write_all(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn upgrade_to_tls(&mut self, _server_name: &str) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn read_response_collects_continuations() {
        let mut t = Lines(VecDeque::from(["250-Hello", "250-SIZE 1000", "250 OK", "221 Bye"]));
        let reply = t.read_response().unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message_text(), "Hello SIZE 1000 OK");
        // The next reply is untouched
        assert_eq!(t.read_response().unwrap().code.as_u16(), 221);
    }

    #[test]
    fn read_response_rejects_non_digit_line() {
        let mut t = Lines(VecDeque::from(["250-Hello", "hello there"]));
        assert!(matches!(t.read_response(), Err(Error::Protocol(_))));
    }

    #[test]
    fn read_response_times_out() {
        let mut t = Lines(VecDeque::from(["250-Hello"]));
        assert!(t.read_response().unwrap_err().is_timeout());
    }

    #[test]
    fn reads_crlf_lines() {
        let mut input: &[u8] = b"250-Hello\r\n250 OK\r\n";
        assert_eq!(read_capped_line(&mut input).unwrap(), "250-Hello");
        assert_eq!(read_capped_line(&mut input).unwrap(), "250 OK");
        let err = read_capped_line(&mut input).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn line_at_limit_is_accepted() {
        let line = format!("250 {}\r\n", "a".repeat(MAX_LINE_BYTES - 6));
        assert_eq!(line.len(), MAX_LINE_BYTES);
        let mut input = line.as_bytes();
        assert_eq!(read_capped_line(&mut input).unwrap().len(), MAX_LINE_BYTES - 2);
    }

    #[test]
    fn endless_line_is_protocol_error() {
        let flood = vec![b'x'; 64 * 1024];
        let mut input = flood.as_slice();
        assert!(matches!(
            read_capped_line(&mut input),
            Err(Error::Protocol(_))
        ));
        // Only the capped prefix was consumed
        assert_eq!(input.len(), flood.len() - MAX_LINE_BYTES);
    }

    #[test]
    fn closed_stream_fails_without_panicking() {
        let mut stream = SmtpStream::Closed;
        assert!(stream.write_line("NOOP").is_err());
        assert!(stream.read_line().is_err());
        stream.close();
        stream.close();
        assert!(!stream.is_tls());
    }
}
