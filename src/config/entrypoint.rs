//! Listener configuration

use serde::{Deserialize, Serialize};

/// Listener configuration
///
/// # Example
///
/// ```hcl
/// server {
///   address = "0.0.0.0:443"
///   tls {
///     cert_file = "/etc/certs/cert.pem"
///     key_file  = "/etc/certs/key.pem"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address in "host:port" format
    #[serde(default = "default_address")]
    pub address: String,

    /// Optional TLS termination
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_address() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the certificate PEM file
    pub cert_file: String,

    /// Path to the private key PEM file
    pub key_file: String,
}
