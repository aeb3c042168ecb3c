//! Identity stores — concrete identity check delegates
//!
//! `HttpIdentityStore` asks an external service; `StaticIdentityStore`
//! checks against accounts loaded from configuration.

use super::{CallerClass, Credentials, IdentityCheck};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Identity check backed by an HTTP identity service.
///
/// Sends `GET {base_url}/{class}` with the caller's Basic credentials.
/// 2xx means valid, 401/403/404 means invalid, anything else is a
/// mechanism failure. Exactly one request per check.
pub struct HttpIdentityStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "identity url cannot be empty".to_string(),
            ));
        }
        // The identity service is addressed directly, never through a proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("identity client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create with a custom client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Endpoint checked for a class
    pub fn endpoint(&self, class: CallerClass) -> String {
        format!("{}/{}", self.base_url, class.label())
    }
}

#[async_trait]
impl IdentityCheck for HttpIdentityStore {
    async fn check(&self, class: CallerClass, credentials: &Credentials) -> Result<bool> {
        let url = self.endpoint(class);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|e| GatewayError::AuthMechanism(format!("identity store unreachable: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        match status.as_u16() {
            401 | 403 | 404 => Ok(false),
            code => Err(GatewayError::AuthMechanism(format!(
                "identity store returned status {}",
                code
            ))),
        }
    }

    fn name(&self) -> &str {
        "http-identity"
    }
}

/// Identity check over a fixed set of accounts
#[derive(Default)]
pub struct StaticIdentityStore {
    accounts: HashMap<(CallerClass, String), String>,
}

impl StaticIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account for a class
    pub fn with_account(
        mut self,
        class: CallerClass,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.accounts
            .insert((class, username.into()), password.into());
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl IdentityCheck for StaticIdentityStore {
    async fn check(&self, class: CallerClass, credentials: &Credentials) -> Result<bool> {
        let stored = self
            .accounts
            .get(&(class, credentials.username.clone()));
        Ok(match stored {
            Some(expected) => bool::from(
                expected
                    .as_bytes()
                    .ct_eq(credentials.password.as_bytes()),
            ),
            None => false,
        })
    }

    fn name(&self) -> &str {
        "static-identity"
    }
}
