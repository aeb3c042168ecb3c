//! Domain resolver — expands a base domain into the gateway's role domains
//!
//! Every role the gateway reasons about lives on a fixed subdomain of the
//! configured base domain:
//!
//! ```text
//! talky.io → api.talky.io, muc.talky.io, upload.talky.io,
//!            anon.talky.io, backend.talky.io
//! ```

use crate::error::{GatewayError, Result};
use serde::Serialize;
use std::fmt;

/// Logical role of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainRole {
    /// HTTP API and token issuer
    Api,
    /// Multi-user chat rooms
    Muc,
    /// File upload service
    Upload,
    /// Anonymous (guest) logins
    Anon,
    /// Internal chat backend
    Backend,
}

impl DomainRole {
    /// All roles, in a stable order
    pub const ALL: [DomainRole; 5] = [
        DomainRole::Api,
        DomainRole::Muc,
        DomainRole::Upload,
        DomainRole::Anon,
        DomainRole::Backend,
    ];

    /// Subdomain prefix for this role
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Muc => "muc",
            Self::Upload => "upload",
            Self::Anon => "anon",
            Self::Backend => "backend",
        }
    }
}

impl fmt::Display for DomainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Immutable role → domain mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSet {
    base: String,
    api: String,
    muc: String,
    upload: String,
    anon: String,
    backend: String,
}

impl DomainSet {
    /// Base domain the set was derived from
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Domain for a role
    pub fn get(&self, role: DomainRole) -> &str {
        match role {
            DomainRole::Api => &self.api,
            DomainRole::Muc => &self.muc,
            DomainRole::Upload => &self.upload,
            DomainRole::Anon => &self.anon,
            DomainRole::Backend => &self.backend,
        }
    }

    pub fn api(&self) -> &str {
        &self.api
    }

    pub fn muc(&self) -> &str {
        &self.muc
    }

    pub fn upload(&self) -> &str {
        &self.upload
    }

    pub fn anon(&self) -> &str {
        &self.anon
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Iterate over (role, domain) pairs
    pub fn iter(&self) -> impl Iterator<Item = (DomainRole, &str)> {
        DomainRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }
}

/// Expand a base domain into the full domain set.
///
/// The base is trimmed and lowercased; anything that is not a plain
/// dotted hostname is rejected with `InvalidConfig`.
pub fn resolve(base_domain: &str) -> Result<DomainSet> {
    let base = base_domain.trim().to_ascii_lowercase();
    validate_base(&base)?;

    let sub = |role: DomainRole| format!("{}.{}", role.prefix(), base);
    Ok(DomainSet {
        api: sub(DomainRole::Api),
        muc: sub(DomainRole::Muc),
        upload: sub(DomainRole::Upload),
        anon: sub(DomainRole::Anon),
        backend: sub(DomainRole::Backend),
        base,
    })
}

fn validate_base(base: &str) -> Result<()> {
    if base.is_empty() {
        return Err(GatewayError::InvalidConfig(
            "base domain cannot be empty".to_string(),
        ));
    }
    // Leave room for the longest prefix ("backend.")
    if base.len() > 253 - "backend.".len() {
        return Err(GatewayError::InvalidConfig(format!(
            "base domain '{}' is too long",
            base
        )));
    }

    for label in base.split('.') {
        if label.is_empty() {
            return Err(GatewayError::InvalidConfig(format!(
                "base domain '{}' has an empty label",
                base
            )));
        }
        if label.len() > 63 {
            return Err(GatewayError::InvalidConfig(format!(
                "base domain '{}' has a label longer than 63 characters",
                base
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(GatewayError::InvalidConfig(format!(
                "base domain '{}' has a label starting or ending with '-'",
                base
            )));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(GatewayError::InvalidConfig(format!(
                "base domain '{}' contains invalid characters",
                base
            )));
        }
    }

    Ok(())
}
