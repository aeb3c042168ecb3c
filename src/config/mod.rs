//! Configuration types for the Talky gateway
//!
//! Uses HCL (HashiCorp Configuration Language) as the configuration format.
//! Loading and validation happen once at startup; every problem found here
//! is an `InvalidConfig` error and stops the process.

mod backend;
mod entrypoint;
mod router;

pub use backend::{AccountConfig, BackendConfig, IdentityConfig};
pub use entrypoint::{ServerConfig, TlsConfig};
pub use router::{HandlerKind, RouteConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::auth::{CallerClass, StrategyRegistry};
use crate::domains::{self, DomainSet};
use crate::error::{GatewayError, Result};

/// Top-level gateway configuration
///
/// # HCL Example
///
/// ```hcl
/// server {
///   address = "0.0.0.0:8000"
/// }
///
/// domains {
///   base = "talky.io"
/// }
///
/// auth {
///   secret = "change-me"
/// }
///
/// backend {
///   mode = "dev"
/// }
///
/// accounts "bots" "bot-1" {
///   password = "s3cret"
/// }
///
/// routes "guest-check" {
///   method   = "GET"
///   path     = "/prosody/auth/guests"
///   strategy = "prosody-guests"
///   handler  = "principal"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Base domain the role domains are derived from
    #[serde(default)]
    pub domains: DomainsConfig,

    /// Token signing settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Chat backend the upgrade proxy bridges to
    #[serde(default)]
    pub backend: BackendConfig,

    /// External identity store; when absent `accounts` is used
    #[serde(default)]
    pub identity: Option<IdentityConfig>,

    /// Static accounts: caller class label → username → account
    #[serde(default)]
    pub accounts: HashMap<String, HashMap<String, AccountConfig>>,

    /// Named routes for the built-in handlers
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

/// Domain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsConfig {
    /// Base domain, e.g. "talky.io"
    pub base: String,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            base: "localhost".to_string(),
        }
    }
}

/// Token authentication settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret
    #[serde(default)]
    pub secret: String,

    /// Reject tokens without an `exp` claim
    #[serde(default)]
    pub require_expiry: bool,
}

impl GatewayConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::InvalidConfig(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| GatewayError::InvalidConfig(format!("Failed to parse HCL config: {}", e)))
    }

    /// Resolve the configured base domain
    pub fn domain_set(&self) -> Result<DomainSet> {
        domains::resolve(&self.domains.base)
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.address.parse().map_err(|e| {
            GatewayError::InvalidConfig(format!(
                "Invalid listen address '{}': {}",
                self.server.address, e
            ))
        })
    }

    /// Static accounts with their class labels parsed, sorted by class and
    /// username
    pub fn static_accounts(&self) -> Result<Vec<(CallerClass, &str, &AccountConfig)>> {
        let mut accounts = Vec::new();
        for (label, members) in &self.accounts {
            let class: CallerClass = label.parse()?;
            for (name, account) in members {
                accounts.push((class, name.as_str(), account));
            }
        }
        accounts.sort_by(|a, b| (a.0.label(), a.1).cmp(&(b.0.label(), b.1)));
        Ok(accounts)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        let domains = self.domain_set()?;
        self.listen_addr()?;

        if self.auth.secret.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "auth.secret (token signing key) is required".to_string(),
            ));
        }

        self.backend.target(&domains)?;
        if self.backend.handshake_timeout_ms == 0 {
            return Err(GatewayError::InvalidConfig(
                "backend.handshake_timeout_ms must be positive".to_string(),
            ));
        }

        if let Some(identity) = &self.identity {
            identity.validate()?;
        }

        for (class, name, account) in self.static_accounts()? {
            if name.is_empty() {
                return Err(GatewayError::InvalidConfig(format!(
                    "account names cannot be empty (class '{}')",
                    class
                )));
            }
            if account.password.is_empty() {
                return Err(GatewayError::InvalidConfig(format!(
                    "account '{}/{}' has an empty password",
                    class, name
                )));
            }
        }

        let known = StrategyRegistry::standard_names();
        for (name, route) in &self.routes {
            route.validate(name)?;
            if let Some(strategy) = &route.strategy {
                if !known.contains(&strategy.as_str()) {
                    return Err(GatewayError::InvalidConfig(format!(
                        "Route '{}' references unknown auth strategy '{}'",
                        name, strategy
                    )));
                }
            }
        }

        Ok(())
    }
}
