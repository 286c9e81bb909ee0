//! Client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Default LDAP port.
pub const DEFAULT_PORT: u16 = 389;

/// LDAP over SSL port.
pub const SSL_PORT: u16 = 636;

/// Global catalog port.
pub const GLOBAL_CATALOG_PORT: u16 = 3268;

/// Global catalog over SSL port.
pub const GLOBAL_CATALOG_SSL_PORT: u16 = 3269;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default server address.
pub const DEFAULT_SERVER: &str = "localhost";

/// A parsed server address.
///
/// Accepts `[ldap://]host[:port][/]`. `ldaps://` is accepted as well and
/// implies SSL. A port that is not numeric is treated as part of the host
/// name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub protocol_version: u8,
}

impl ServerAddress {
    /// Parse a server string.
    pub fn parse(server: &str) -> Result<Self, Error> {
        let trimmed = server.trim();

        let (rest, scheme_ssl) = if let Some(rest) = strip_prefix_ignore_case(trimmed, "ldap://") {
            (rest, false)
        } else if let Some(rest) = strip_prefix_ignore_case(trimmed, "ldaps://") {
            (rest, true)
        } else {
            (trimmed, false)
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        if let Some((_, container)) = rest.split_once('/') {
            return Err(Error::Configuration(format!(
                "server address '{}' includes the container '{}'; connect to the server and query that container separately",
                server, container
            )));
        }

        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (rest, None),
            },
            None => (rest, None),
        };
        if host.is_empty() {
            return Err(Error::Configuration(format!(
                "server address '{}' has no host",
                server
            )));
        }

        let port = port.unwrap_or(if scheme_ssl { SSL_PORT } else { DEFAULT_PORT });
        let use_ssl = scheme_ssl || port == SSL_PORT || port == GLOBAL_CATALOG_SSL_PORT;

        Ok(Self {
            host: host.to_string(),
            port,
            use_ssl,
            protocol_version: dirquery_proto::PROTOCOL_VERSION,
        })
    }

    /// True for either global catalog port.
    pub fn is_global_catalog(&self) -> bool {
        self.port == GLOBAL_CATALOG_PORT || self.port == GLOBAL_CATALOG_SSL_PORT
    }

    /// URL understood by the transport.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// Simple bind credentials.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub bind_dn: String,
    pub password: String,
}

impl Credentials {
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server string, e.g. `ldap://dc01.example.com:389`.
    pub server: String,

    /// Credentials for a simple bind. Anonymous when absent.
    pub credentials: Option<Credentials>,

    /// Transport timeout in milliseconds, applied to connect and to every request.
    pub timeout_ms: u64,

    /// Upgrade a plain connection with StartTLS.
    pub use_starttls: bool,

    /// Skip TLS certificate verification.
    pub no_tls_verify: bool,
}

impl ConnectionConfig {
    /// Create a configuration for the given server.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            credentials: None,
            timeout_ms: millis(DEFAULT_TIMEOUT),
            use_starttls: false,
            no_tls_verify: false,
        }
    }

    /// Set bind credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    /// Enable StartTLS.
    pub fn with_starttls(mut self, enabled: bool) -> Self {
        self.use_starttls = enabled;
        self
    }

    /// Disable certificate verification.
    pub fn with_no_tls_verify(mut self, enabled: bool) -> Self {
        self.no_tls_verify = enabled;
        self
    }

    /// Transport timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
