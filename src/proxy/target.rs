//! Target endpoints — canonical `scheme://host:port` construction
//!
//! Backend addresses are never stored as free-form strings; they are built
//! on demand from a validated (scheme, host, port) triple.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// URL schemes the gateway knows how to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    Wss,
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Whether the scheme implies TLS on the wire
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Wss | Self::Https)
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::Ws
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(GatewayError::InvalidConfig(format!(
                "unsupported scheme '{}' (expected ws, wss, http or https)",
                other
            ))),
        }
    }
}

/// Build the canonical endpoint string `scheme://host:port`.
///
/// The port is taken as a wide integer so out-of-range values coming from
/// configuration are reported instead of silently truncated.
pub fn build_url(scheme: Scheme, host: &str, port: u32) -> Result<String> {
    let port = validate_port(port)?;
    validate_host(host)?;
    Ok(format!("{}://{}:{}", scheme, host, port))
}

/// Check that a port lies in [1, 65535]
pub fn validate_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(GatewayError::InvalidConfig(format!(
            "port {} is outside the range 1-65535",
            port
        ))),
    }
}

fn validate_host(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(GatewayError::InvalidConfig("host cannot be empty".to_string()));
    }
    if host
        .bytes()
        .any(|b| b.is_ascii_whitespace() || b == b'/' || b == b'@' || b == b'?' || b == b'#')
    {
        return Err(GatewayError::InvalidConfig(format!(
            "host '{}' contains invalid characters",
            host
        )));
    }
    Ok(())
}

/// A validated backend address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl TargetEndpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u32) -> Result<Self> {
        let host = host.into();
        let port = validate_port(port)?;
        validate_host(&host)?;
        Ok(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for socket connects
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Canonical URL string
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Deployment mode of the chat backend, which fixes its WebSocket port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    /// Local development, plain listener
    Dev,
    /// Local development against the TLS listener
    DevTls,
    /// Production (TLS listener)
    Production,
}

/// Backend plain WebSocket port
pub const PLAIN_WS_PORT: u16 = 5280;
/// Backend TLS WebSocket port
pub const TLS_WS_PORT: u16 = 5281;

impl BackendMode {
    pub fn ws_port(self) -> u16 {
        match self {
            Self::Dev => PLAIN_WS_PORT,
            Self::DevTls | Self::Production => TLS_WS_PORT,
        }
    }
}

impl Default for BackendMode {
    fn default() -> Self {
        Self::Production
    }
}
