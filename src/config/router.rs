//! Route configuration — method/path entries bound to a strategy and handler

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Route configuration
///
/// # Example
///
/// ```hcl
/// routes "bot-check" {
///   method   = "GET"
///   path     = "/prosody/auth/bots"
///   strategy = "prosody-bots"
///   handler  = "principal"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// HTTP method (default GET)
    #[serde(default = "default_method")]
    pub method: String,

    /// Exact request path
    pub path: String,

    /// Auth strategy name; unauthenticated when absent
    #[serde(default)]
    pub strategy: Option<String>,

    /// Built-in handler serving the route
    pub handler: HandlerKind,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Built-in handlers available to configured routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Echo the authenticated principal as JSON
    Principal,
    /// Report gateway health
    Health,
}

impl RouteConfig {
    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(GatewayError::InvalidConfig(format!(
                "Route '{}': path '{}' must start with '/'",
                name, self.path
            )));
        }
        if http::Method::from_bytes(self.method.as_bytes()).is_err() {
            return Err(GatewayError::InvalidConfig(format!(
                "Route '{}': invalid method '{}'",
                name, self.method
            )));
        }
        if self.handler == HandlerKind::Principal && self.strategy.is_none() {
            return Err(GatewayError::InvalidConfig(format!(
                "Route '{}': the principal handler needs an auth strategy",
                name
            )));
        }
        Ok(())
    }
}
