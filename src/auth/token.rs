//! Token validator — HS256 JSON Web Tokens issued by the API domain
//!
//! A token is accepted only if all of these hold:
//!
//! 1. it is signed with HS256 under the configured secret (any other
//!    algorithm, including `none`, is rejected before verification)
//! 2. it is inside its validity window: `nbf <= now < exp`
//! 3. its `iss` claim equals the expected issuer
//!
//! Time claims are NumericDates and may be fractional. They are checked
//! here rather than by `jsonwebtoken`, which only understands integer
//! seconds and skips a claim it cannot parse.

use super::{AuthVerdict, Principal, RejectReason};
use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, get_current_timestamp, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// The only accepted signing algorithm
const ALLOWED_ALGORITHM: &str = "HS256";

/// Decoded token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time (UTC timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<Number>,
    /// Not before (UTC timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<Number>,
    /// Issued at (UTC timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<Number>,
    /// Any application-specific claims
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validates signed tokens against a shared secret
pub struct TokenValidator {
    decoding_key: DecodingKey,
    require_expiry: bool,
}

impl TokenValidator {
    /// Create from the HMAC secret. An empty secret is a configuration error.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "token signing secret cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            require_expiry: false,
        })
    }

    /// Reject tokens that carry no `exp` claim
    pub fn require_expiry(mut self, require: bool) -> Self {
        self.require_expiry = require;
        self
    }

    fn validation(&self, expected_issuer: &str) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_issuer(&[expected_issuer]);
        validation.set_required_spec_claims(&["iss"]);
        validation
    }

    /// Check `nbf` and `exp` against the current time, with no leeway
    fn check_time(&self, claims: &Claims) -> std::result::Result<(), RejectReason> {
        let now = get_current_timestamp() as f64;

        if let Some(nbf) = numeric_date(claims.nbf.as_ref())? {
            if nbf > now {
                return Err(RejectReason::NotYetValid);
            }
        }

        match numeric_date(claims.exp.as_ref())? {
            Some(exp) if now >= exp => Err(RejectReason::Expired),
            Some(_) => Ok(()),
            None if self.require_expiry => Err(RejectReason::MissingExpiry),
            None => Ok(()),
        }
    }

    /// Validate a token and check its issuer
    pub fn validate_token(&self, token: &str, expected_issuer: &str) -> AuthVerdict {
        match self.check(token, expected_issuer) {
            Ok(claims) => AuthVerdict::Accepted(Principal::token(claims)),
            Err(reason) => {
                tracing::debug!(reason = %reason, "Token rejected");
                AuthVerdict::Rejected(reason)
            }
        }
    }

    fn check(&self, token: &str, expected_issuer: &str) -> std::result::Result<Claims, RejectReason> {
        let alg = header_algorithm(token)?;
        if alg != ALLOWED_ALGORITHM {
            return Err(RejectReason::DisallowedAlgorithm);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation(expected_issuer))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => RejectReason::DisallowedAlgorithm,
                ErrorKind::InvalidSignature => RejectReason::BadSignature,
                ErrorKind::InvalidIssuer => RejectReason::IssuerMismatch,
                ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
                    RejectReason::IssuerMismatch
                }
                _ => RejectReason::MalformedToken,
            })?;

        self.check_time(&claims)?;
        Ok(claims)
    }
}

fn numeric_date(value: Option<&Number>) -> std::result::Result<Option<f64>, RejectReason> {
    match value {
        None => Ok(None),
        Some(n) => n.as_f64().map(Some).ok_or(RejectReason::MalformedToken),
    }
}

/// Read the `alg` field from the token header without trusting anything else
fn header_algorithm(token: &str) -> std::result::Result<String, RejectReason> {
    let mut segments = token.split('.');
    let header = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(h), Some(_), Some(_), None) if !h.is_empty() => h,
        _ => return Err(RejectReason::MalformedToken),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header.trim_end_matches('='))
        .map_err(|_| RejectReason::MalformedToken)?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|_| RejectReason::MalformedToken)?;

    value
        .get("alg")
        .and_then(|alg| alg.as_str())
        .map(|alg| alg.to_string())
        .ok_or(RejectReason::MalformedToken)
}
