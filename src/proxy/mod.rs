//! Proxy layer — bridging upgraded connections to the chat backend
//!
//! Handles target construction, upgrade negotiation, the raw byte relay
//! and TLS termination for the listener.

pub mod target;
pub mod tcp;
pub mod tls;
pub mod upgrade;

pub use target::{build_url, BackendMode, Scheme, TargetEndpoint};
pub use upgrade::{is_upgrade_request, ProxyStats, SessionState, UpgradeProxy};
