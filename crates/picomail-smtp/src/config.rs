//! Client configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{Address, AuthMechanism};

/// Default timeout for each individual network read or write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of extra attempts for the recipient step.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default pause between recipient-step attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default EHLO/HELO argument.
pub const DEFAULT_LOCAL_NAME: &str = "localhost";

/// Security mode for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Implicit,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl TlsMode {
    /// Conventional submission port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::Implicit => 465,
            Self::StartTls => 587,
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Implicit => "implicit",
            Self::StartTls => "starttls",
        })
    }
}

/// Username and password for AUTH.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name, usually the full email address.
    pub username: String,
    /// Password or app-specific password.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection and session parameters for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server hostname; also the TLS server name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub tls: TlsMode,
    /// Credentials; AUTH is skipped when absent.
    pub credentials: Option<Credentials>,
    /// Mechanism used when credentials are present.
    pub auth_mechanism: AuthMechanism,
    /// Envelope sender. Falls back to the username.
    pub sender: Option<String>,
    /// Name announced in EHLO/HELO.
    pub local_name: String,
    /// Bound on every single read, write and connect.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Extra attempts for the recipient step after a transient failure.
    pub max_retries: u32,
    /// Pause between recipient-step attempts.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: TlsMode::default().default_port(),
            tls: TlsMode::default(),
            credentials: None,
            auth_mechanism: AuthMechanism::default(),
            sender: None,
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `host:port` with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the credentials used for AUTH.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the AUTH mechanism.
    #[must_use]
    pub const fn auth_mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.auth_mechanism = mechanism;
        self
    }

    /// Sets the envelope sender.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the name announced in EHLO/HELO.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries for the recipient step.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the pause between retries.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// `host:port`, as dialled.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retry policy for the recipient step.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Resolves the envelope sender.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither a sender nor a username is set,
    /// or [`Error::InvalidAddress`] if the result is not an address.
    pub fn sender_address(&self) -> Result<Address> {
        let raw = self
            .sender
            .as_deref()
            .or_else(|| self.credentials.as_ref().map(|c| c.username.as_str()))
            .ok_or_else(|| Error::Config("no sender and no username configured".into()))?;
        Address::new(raw)
    }

    /// Checks the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        if self.local_name.trim().is_empty() || self.local_name.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "invalid local name: {:?}",
                self.local_name
            )));
        }
        Ok(())
    }
}

/// Serde helpers storing a [`Duration`] as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
