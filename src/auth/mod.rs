//! Authentication — caller classes, verdicts and credential extraction
//!
//! Two mechanisms guard routed requests:
//!
//! - **basic**: `Authorization: Basic …` credentials checked against the
//!   identity store for one caller class (guest, user, bot, api peer)
//! - **token**: HS256-signed JWT whose issuer must be the API domain
//!
//! Both produce an [`AuthVerdict`], which keeps "explicitly rejected" apart
//! from "the verification mechanism failed".

mod credentials;
mod identity;
mod strategy;
mod token;

pub use credentials::{CredentialValidator, IdentityCheck};
pub use identity::{HttpIdentityStore, StaticIdentityStore};
pub use strategy::{
    extract_token, AuthScheme, Strategy, StrategyRegistry, Verifier, CLIENT_TOKEN_STRATEGY,
};
pub use token::{Claims, TokenValidator};

use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Class of caller — decides which identity check a credential goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallerClass {
    #[serde(rename = "guests")]
    Guest,
    #[serde(rename = "users")]
    User,
    #[serde(rename = "bots")]
    Bot,
    #[serde(rename = "api")]
    ApiPeer,
}

impl CallerClass {
    pub const ALL: [CallerClass; 4] = [
        CallerClass::Guest,
        CallerClass::User,
        CallerClass::Bot,
        CallerClass::ApiPeer,
    ];

    /// Identity-store namespace, also used as the Basic realm
    pub fn label(self) -> &'static str {
        match self {
            Self::Guest => "guests",
            Self::User => "users",
            Self::Bot => "bots",
            Self::ApiPeer => "api",
        }
    }

    /// Name of the basic strategy registered for this class
    pub fn strategy_name(self) -> &'static str {
        match self {
            Self::Guest => "prosody-guests",
            Self::User => "prosody-users",
            Self::Bot => "prosody-bots",
            Self::ApiPeer => "prosody-api",
        }
    }
}

impl fmt::Display for CallerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CallerClass {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "guests" | "guest" => Ok(Self::Guest),
            "users" | "user" => Ok(Self::User),
            "bots" | "bot" => Ok(Self::Bot),
            "api" | "api-peer" => Ok(Self::ApiPeer),
            other => Err(GatewayError::InvalidConfig(format!(
                "unknown caller class '{}'",
                other
            ))),
        }
    }
}

/// Username/password pair taken from a Basic `Authorization` header
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse a `Basic <base64(user:pass)>` header value. The scheme name is
    /// case-insensitive.
    pub fn from_basic_header(value: &str) -> std::result::Result<Self, RejectReason> {
        let encoded = match split_scheme(value) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("basic") => rest,
            _ => return Err(RejectReason::MissingCredentials),
        };

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| RejectReason::MalformedCredentials)?;
        let decoded = String::from_utf8(decoded).map_err(|_| RejectReason::MalformedCredentials)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(RejectReason::MalformedCredentials)?;
        if username.is_empty() {
            return Err(RejectReason::MalformedCredentials);
        }

        Ok(Self::new(username, password))
    }

    /// Encode back into a `Basic …` header value
    pub fn to_basic_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

/// Split an `Authorization` value into its scheme and the trimmed rest
pub(crate) fn split_scheme(value: &str) -> Option<(&str, &str)> {
    let value = value.trim_start();
    let (scheme, rest) = value.split_once(|c: char| c.is_ascii_whitespace())?;
    Some((scheme, rest.trim()))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated identity handed to route handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    /// Username or token subject
    pub id: String,
    /// Caller class, for credential-based logins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<CallerClass>,
    /// Decoded claims, for token-based logins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
}

impl Principal {
    pub fn credentials(class: CallerClass, username: impl Into<String>) -> Self {
        Self {
            id: username.into(),
            class: Some(class),
            claims: None,
        }
    }

    pub fn token(claims: Claims) -> Self {
        Self {
            id: claims.sub.clone().unwrap_or_default(),
            class: None,
            claims: Some(claims),
        }
    }
}

/// Why a credential or token was refused. For operator logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingCredentials,
    MalformedCredentials,
    InvalidCredentials,
    MalformedToken,
    DisallowedAlgorithm,
    BadSignature,
    Expired,
    NotYetValid,
    MissingExpiry,
    IssuerMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingCredentials => "missing credentials",
            Self::MalformedCredentials => "malformed credentials",
            Self::InvalidCredentials => "invalid credentials",
            Self::MalformedToken => "malformed token",
            Self::DisallowedAlgorithm => "disallowed signing algorithm",
            Self::BadSignature => "signature mismatch",
            Self::Expired => "token expired",
            Self::NotYetValid => "token not yet valid",
            Self::MissingExpiry => "token has no expiry",
            Self::IssuerMismatch => "issuer mismatch",
        };
        f.write_str(s)
    }
}

/// Outcome of one authentication attempt
#[derive(Debug)]
pub enum AuthVerdict {
    Accepted(Principal),
    Rejected(RejectReason),
    /// The mechanism failed before it could decide
    Error(GatewayError),
}

impl AuthVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Collapse into a `Result`, mapping rejections to `AuthRejected`
    pub fn into_result(self) -> Result<Principal> {
        match self {
            Self::Accepted(principal) => Ok(principal),
            Self::Rejected(reason) => Err(GatewayError::AuthRejected(reason)),
            Self::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_class_labels() {
        assert_eq!(CallerClass::Guest.label(), "guests");
        assert_eq!(CallerClass::User.label(), "users");
        assert_eq!(CallerClass::Bot.label(), "bots");
        assert_eq!(CallerClass::ApiPeer.label(), "api");
    }

    #[test]
    fn test_caller_class_strategy_names() {
        let names: Vec<_> = CallerClass::ALL.iter().map(|c| c.strategy_name()).collect();
        assert_eq!(
            names,
            vec!["prosody-guests", "prosody-users", "prosody-bots", "prosody-api"]
        );
    }

    #[test]
    fn test_caller_class_from_str() {
        for class in CallerClass::ALL {
            assert_eq!(class.label().parse::<CallerClass>().unwrap(), class);
        }
        assert!("admins".parse::<CallerClass>().is_err());
    }

    #[test]
    fn test_caller_class_serde() {
        let class: CallerClass = serde_json::from_str(r#""bots""#).unwrap();
        assert_eq!(class, CallerClass::Bot);
        assert_eq!(serde_json::to_string(&CallerClass::ApiPeer).unwrap(), r#""api""#);
    }

    #[test]
    fn test_basic_header_parse() {
        // "admin:secret"
        let creds = Credentials::from_basic_header("Basic YWRtaW46c2VjcmV0").unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_basic_scheme_is_case_insensitive() {
        for header in [
            "BASIC YWRtaW46c2VjcmV0",
            "bAsIc YWRtaW46c2VjcmV0",
            "basic   YWRtaW46c2VjcmV0 ",
            "Basic\tYWRtaW46c2VjcmV0",
        ] {
            let creds = Credentials::from_basic_header(header).unwrap();
            assert_eq!(creds.username, "admin", "header {:?}", header);
            assert_eq!(creds.password, "secret");
        }
    }

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("Bearer  abc "), Some(("Bearer", "abc")));
        assert_eq!(split_scheme("abc"), None);
        assert_eq!(
            Credentials::from_basic_header("BasicYWRtaW46c2VjcmV0").unwrap_err(),
            RejectReason::MissingCredentials
        );
    }

    #[test]
    fn test_basic_header_password_with_colon() {
        let header = Credentials::new("bot", "a:b:c").to_basic_header();
        let creds = Credentials::from_basic_header(&header).unwrap();
        assert_eq!(creds.password, "a:b:c");
    }

    #[test]
    fn test_basic_header_rejections() {
        assert_eq!(
            Credentials::from_basic_header("Bearer abc").unwrap_err(),
            RejectReason::MissingCredentials
        );
        assert_eq!(
            Credentials::from_basic_header("Basic !!!").unwrap_err(),
            RejectReason::MalformedCredentials
        );
        // "nocolon"
        assert_eq!(
            Credentials::from_basic_header("Basic bm9jb2xvbg==").unwrap_err(),
            RejectReason::MalformedCredentials
        );
        // ":pass"
        assert_eq!(
            Credentials::from_basic_header("Basic OnBhc3M=").unwrap_err(),
            RejectReason::MalformedCredentials
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_verdict_into_result() {
        let ok = AuthVerdict::Accepted(Principal::credentials(CallerClass::User, "alice"));
        assert_eq!(ok.into_result().unwrap().id, "alice");

        let rejected = AuthVerdict::Rejected(RejectReason::InvalidCredentials);
        assert!(matches!(
            rejected.into_result(),
            Err(GatewayError::AuthRejected(RejectReason::InvalidCredentials))
        ));

        let failed = AuthVerdict::Error(GatewayError::AuthMechanism("down".into()));
        assert!(matches!(
            failed.into_result(),
            Err(GatewayError::AuthMechanism(_))
        ));
    }
}
