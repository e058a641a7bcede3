//! Configuration file and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use picomail_smtp::{ClientConfig, Credentials, TlsMode};
use serde::{Deserialize, Serialize};

/// Environment variable consulted for the password when `--user` is given.
pub const PASSWORD_ENV: &str = "PICOMAIL_PASSWORD";

/// Send one message, as email or through an email-to-SMS gateway.
#[derive(Debug, Parser)]
#[command(name = "picomail", version, about)]
pub struct Cli {
    /// Recipients; each gets its own transaction in the same session.
    #[arg(required = true)]
    pub recipients: Vec<String>,

    /// Configuration file (defaults to `<config dir>/picomail/config.json`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SMTP server hostname.
    #[arg(long)]
    pub host: Option<String>,

    /// SMTP server port. Defaults to the conventional port of the TLS mode.
    #[arg(long)]
    pub port: Option<u16>,

    /// Connection security.
    #[arg(long, value_enum)]
    pub tls: Option<TlsArg>,

    /// Login name. The password is read from `PICOMAIL_PASSWORD`.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Envelope sender, if different from the login name.
    #[arg(long)]
    pub from: Option<String>,

    /// Subject header.
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Extra header lines, e.g. `--header "X-Sensor: greenhouse"`.
    #[arg(long = "header", value_name = "LINE")]
    pub headers: Vec<String>,

    /// Message body. Read from stdin when omitted.
    #[arg(short, long)]
    pub body: Option<String>,

    /// Add MIME-Version and a UTF-8 Content-Type.
    #[arg(long)]
    pub mime: bool,
}

/// `--tls` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TlsArg {
    /// Plain text.
    None,
    /// TLS from the first byte.
    Implicit,
    /// Upgrade with STARTTLS.
    Starttls,
}

impl From<TlsArg> for TlsMode {
    fn from(arg: TlsArg) -> Self {
        match arg {
            TlsArg::None => Self::None,
            TlsArg::Implicit => Self::Implicit,
            TlsArg::Starttls => Self::StartTls,
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SMTP client settings.
    pub smtp: ClientConfig,
    /// Headers written before any given on the command line.
    pub headers: Vec<String>,
}

impl Settings {
    /// Loads settings from `path`, or from the default location.
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let path = default_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Applies command-line overrides to the file settings.
    pub fn apply(&mut self, cli: &Cli, password: Option<String>) -> Result<()> {
        let smtp = &mut self.smtp;
        if let Some(host) = &cli.host {
            smtp.host.clone_from(host);
        }
        if let Some(tls) = cli.tls {
            smtp.tls = tls.into();
            if cli.port.is_none() {
                smtp.port = smtp.tls.default_port();
            }
        }
        if let Some(port) = cli.port {
            smtp.port = port;
        }
        if let Some(user) = &cli.user {
            let password = password
                .with_context(|| format!("--user needs the password in {PASSWORD_ENV}"))?;
            smtp.credentials = Some(Credentials::new(user.clone(), password));
        }
        if let Some(from) = &cli.from {
            smtp.sender = Some(from.clone());
        }
        self.headers.extend(cli.headers.iter().cloned());
        if let Some(subject) = &cli.subject {
            self.headers.push(format!("Subject: {subject}"));
        }
        Ok(())
    }
}

/// `<config dir>/picomail/config.json`, or `./picomail/config.json` when the
/// platform has no config directory.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picomail")
        .join("config.json")
}
