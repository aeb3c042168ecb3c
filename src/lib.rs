//! # Talky Gateway
//!
//! Authenticating front door for the Talky chat backend. It terminates
//! HTTP(S), authenticates four classes of caller with Basic credentials or
//! signed tokens, and bridges WebSocket upgrades to the chat server.
//!
//! ## Architecture
//!
//! ```text
//! Listener ─┬─ Upgrade header ─→ Upgrade Proxy ─→ Chat backend (raw byte relay)
//!           └─ otherwise ──────→ Route Table → Auth Strategy → Handler
//! ```
//!
//! ## Core Features
//!
//! - **Caller classes**: guests, users, bots and API peers, each checked
//!   against its own identity-store namespace
//! - **Token auth**: HS256 tokens whose issuer must be the API domain
//! - **Domain resolution**: api, muc, upload, anon and backend domains
//!   derived from one base domain
//! - **Upgrade proxy**: one backend connection per session, bounded
//!   handshake, prompt close propagation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use talky_gateway::{config::GatewayConfig, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> talky_gateway::Result<()> {
//!     let config = GatewayConfig::from_file("gateway.hcl").await?;
//!     let gateway = Gateway::new(config, vec![])?;
//!     gateway.start().await?;
//!     gateway.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod domains;
pub(crate) mod entrypoint;
pub mod error;
pub mod gateway;
pub mod proxy;
pub mod router;

// Re-export main types
pub use auth::{AuthVerdict, CallerClass, Principal, RejectReason};
pub use domains::{DomainRole, DomainSet};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use router::{Handler, Route};

use serde::{Deserialize, Serialize};

/// Gateway runtime state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GatewayState {
    /// Gateway has been created but not yet started
    #[default]
    Created,
    /// Gateway is binding its listener
    Starting,
    /// Gateway is accepting connections
    Running,
    /// Gateway is closing the listener and live sessions
    Stopping,
    /// Gateway has fully stopped
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Gateway health status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current gateway state
    pub state: GatewayState,
    /// Uptime in seconds since the gateway was created
    pub uptime_secs: u64,
    /// Proxy sessions not yet closed
    pub active_sessions: usize,
    /// Proxy sessions opened since start
    pub total_sessions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_state_default() {
        assert_eq!(GatewayState::default(), GatewayState::Created);
    }

    #[test]
    fn test_gateway_state_display() {
        assert_eq!(GatewayState::Created.to_string(), "created");
        assert_eq!(GatewayState::Starting.to_string(), "starting");
        assert_eq!(GatewayState::Running.to_string(), "running");
        assert_eq!(GatewayState::Stopping.to_string(), "stopping");
        assert_eq!(GatewayState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_health_status_default() {
        let health = HealthStatus::default();
        assert_eq!(health.state, GatewayState::Created);
        assert_eq!(health.uptime_secs, 0);
        assert_eq!(health.active_sessions, 0);
        assert_eq!(health.total_sessions, 0);
    }

    #[test]
    fn test_health_status_serialization() {
        let health = HealthStatus {
            state: GatewayState::Running,
            uptime_secs: 3600,
            active_sessions: 4,
            total_sessions: 120,
        };
        let json = serde_json::to_string(&health).unwrap();
        let parsed: HealthStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state, GatewayState::Running);
        assert_eq!(parsed.active_sessions, 4);
        assert_eq!(parsed.total_sessions, 120);
    }
}
