//! Backend and identity configuration

use crate::domains::DomainSet;
use crate::error::{GatewayError, Result};
use crate::proxy::target::{BackendMode, Scheme, TargetEndpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat backend the upgrade proxy bridges to
///
/// The host defaults to the API domain and the port to the mode's fixed
/// WebSocket port (5280 plain for `dev`, 5281 otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Deployment mode (dev, dev-tls, production)
    #[serde(default)]
    pub mode: BackendMode,

    /// Scheme used to address the backend
    #[serde(default)]
    pub scheme: Scheme,

    /// Host override
    #[serde(default)]
    pub host: Option<String>,

    /// Port override
    #[serde(default)]
    pub port: Option<u32>,

    /// Upper bound on connect + handshake, in milliseconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

fn default_handshake_timeout() -> u64 {
    10_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            scheme: Scheme::default(),
            host: None,
            port: None,
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

impl BackendConfig {
    /// Build the backend target from the resolved domains
    pub fn target(&self, domains: &DomainSet) -> Result<TargetEndpoint> {
        if self.scheme.is_secure() {
            return Err(GatewayError::InvalidConfig(format!(
                "backend scheme '{}' is not supported; the backend is reached over plain TCP",
                self.scheme
            )));
        }
        let host = self.host.as_deref().unwrap_or(domains.api());
        let port = self.port.unwrap_or(u32::from(self.mode.ws_port()));
        TargetEndpoint::new(self.scheme, host, port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// External HTTP identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL; the caller class label is appended as a path segment
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_identity_timeout")]
    pub timeout_ms: u64,
}

fn default_identity_timeout() -> u64 {
    5_000
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(GatewayError::InvalidConfig(format!(
                "identity.url '{}' must be an http(s) URL",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(GatewayError::InvalidConfig(
                "identity.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A static account, declared as `accounts "<class>" "<username>" { ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Shared secret
    pub password: String,
}
