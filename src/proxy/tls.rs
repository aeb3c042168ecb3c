//! TLS termination — rustls-based TLS acceptor for the listener
//!
//! Certificate and key problems are configuration errors: they are found
//! once at startup and stop the process.

use crate::config::TlsConfig;
use crate::error::{GatewayError, Result};
use rustls::ServerConfig;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Build a TLS acceptor from configuration
pub fn build_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor> {
    let server_config = build_server_config(config)?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Build a rustls ServerConfig from certificate and key files
fn build_server_config(config: &TlsConfig) -> Result<ServerConfig> {
    let cert_path = Path::new(&config.cert_file);
    let key_path = Path::new(&config.key_file);

    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        GatewayError::InvalidConfig(format!(
            "Failed to open certificate file {}: {}",
            cert_path.display(),
            e
        ))
    })?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::InvalidConfig(format!("Failed to parse certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(GatewayError::InvalidConfig(
            "No certificates found in certificate file".to_string(),
        ));
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        GatewayError::InvalidConfig(format!(
            "Failed to open key file {}: {}",
            key_path.display(),
            e
        ))
    })?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| GatewayError::InvalidConfig(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| GatewayError::InvalidConfig("No private key found in key file".to_string()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::InvalidConfig(format!("TLS protocol configuration: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| GatewayError::InvalidConfig(format!("TLS configuration error: {}", e)))?;

    // Upgrades only exist in HTTP/1.1
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(server_config)
}
