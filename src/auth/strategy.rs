//! Auth strategy registry — named strategies for the route table
//!
//! A strategy binds a name (e.g. `prosody-guests`) to a scheme and a
//! validator already specialised to its caller class or expected issuer.
//! Registration happens once at startup; afterwards the registry is only
//! read, and is shared across connections without locking.

use super::{
    split_scheme, AuthVerdict, CallerClass, CredentialValidator, Credentials, RejectReason,
    TokenValidator,
};
use crate::domains::DomainSet;
use crate::error::{GatewayError, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the token strategy
pub const CLIENT_TOKEN_STRATEGY: &str = "client-token";

/// Authentication scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Token,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => f.write_str("basic"),
            Self::Token => f.write_str("token"),
        }
    }
}

/// Validator partially applied to its class or issuer
#[derive(Clone)]
pub enum Verifier {
    Credentials {
        validator: Arc<CredentialValidator>,
        class: CallerClass,
    },
    Token {
        validator: Arc<TokenValidator>,
        issuer: String,
    },
}

impl Verifier {
    fn scheme(&self) -> AuthScheme {
        match self {
            Self::Credentials { .. } => AuthScheme::Basic,
            Self::Token { .. } => AuthScheme::Token,
        }
    }
}

/// A named authentication strategy
pub struct Strategy {
    name: String,
    scheme: AuthScheme,
    verifier: Verifier,
}

impl Strategy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Realm label attached to challenges
    pub fn realm(&self) -> &str {
        match &self.verifier {
            Verifier::Credentials { class, .. } => class.label(),
            Verifier::Token { .. } => "token",
        }
    }

    /// `WWW-Authenticate` value sent with a 401
    pub fn challenge(&self) -> String {
        match self.scheme {
            AuthScheme::Basic => format!("Basic realm=\"{}\"", self.realm()),
            AuthScheme::Token => "Bearer".to_string(),
        }
    }

    /// Authenticate a request against this strategy
    pub async fn authenticate(&self, req: &http::request::Parts) -> AuthVerdict {
        match &self.verifier {
            Verifier::Credentials { validator, class } => {
                let header = match authorization(req) {
                    Some(h) => h,
                    None => return AuthVerdict::Rejected(RejectReason::MissingCredentials),
                };
                match Credentials::from_basic_header(header) {
                    Ok(credentials) => validator.validate(*class, &credentials).await,
                    Err(reason) => AuthVerdict::Rejected(reason),
                }
            }
            Verifier::Token { validator, issuer } => match extract_token(req) {
                Some(token) => validator.validate_token(&token, issuer),
                None => AuthVerdict::Rejected(RejectReason::MissingCredentials),
            },
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("scheme", &self.scheme)
            .field("realm", &self.realm())
            .finish()
    }
}

fn authorization(req: &http::request::Parts) -> Option<&str> {
    req.headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Cookie carrying a client token
const TOKEN_COOKIE: &str = "token";

/// Find a token, in order of precedence:
///
/// 1. the `Authorization` header, with or without a `Bearer` scheme (the
///    scheme name is case-insensitive)
/// 2. a `token` query parameter, percent-decoded
/// 3. a `token` cookie
pub fn extract_token(req: &http::request::Parts) -> Option<Cow<'_, str>> {
    if let Some(value) = authorization(req) {
        let token = match split_scheme(value) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
            _ if value.trim().eq_ignore_ascii_case("bearer") => "",
            _ => value.trim(),
        };
        if !token.is_empty() {
            return Some(Cow::Borrowed(token));
        }
    }

    let from_query = req.uri.query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.strip_prefix("token="))
            .find(|t| !t.is_empty())
    });
    if let Some(raw) = from_query {
        return Some(urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw)));
    }

    req.headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| Cow::Borrowed(value.trim_matches('"')))
}

/// Registry of named strategies
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names registered by [`StrategyRegistry::standard`]
    pub fn standard_names() -> Vec<&'static str> {
        CallerClass::ALL
            .iter()
            .map(|class| class.strategy_name())
            .chain(std::iter::once(CLIENT_TOKEN_STRATEGY))
            .collect()
    }

    /// The gateway's standard strategies: one basic strategy per caller
    /// class plus `client-token` bound to the API domain as issuer.
    pub fn standard(
        credentials: Arc<CredentialValidator>,
        tokens: Arc<TokenValidator>,
        domains: &DomainSet,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for class in CallerClass::ALL {
            registry.register(
                class.strategy_name(),
                AuthScheme::Basic,
                Verifier::Credentials {
                    validator: credentials.clone(),
                    class,
                },
            )?;
        }
        registry.register(
            CLIENT_TOKEN_STRATEGY,
            AuthScheme::Token,
            Verifier::Token {
                validator: tokens,
                issuer: domains.api().to_string(),
            },
        )?;
        Ok(registry)
    }

    /// Register a strategy. Duplicate names and scheme/verifier mismatches
    /// are configuration errors.
    pub fn register(&mut self, name: &str, scheme: AuthScheme, verifier: Verifier) -> Result<()> {
        if name.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "strategy name cannot be empty".to_string(),
            ));
        }
        if self.strategies.contains_key(name) {
            return Err(GatewayError::InvalidConfig(format!(
                "strategy '{}' is already registered",
                name
            )));
        }
        if verifier.scheme() != scheme {
            return Err(GatewayError::InvalidConfig(format!(
                "strategy '{}' declares scheme '{}' but its verifier is '{}'",
                name,
                scheme,
                verifier.scheme()
            )));
        }

        tracing::debug!(strategy = name, scheme = %scheme, "Auth strategy registered");
        self.strategies.insert(
            name.to_string(),
            Arc::new(Strategy {
                name: name.to_string(),
                scheme,
                verifier,
            }),
        );
        Ok(())
    }

    /// Look up a strategy by name
    pub fn resolve(&self, name: &str) -> Result<Arc<Strategy>> {
        self.strategies.get(name).cloned().ok_or_else(|| {
            GatewayError::InvalidConfig(format!("unknown auth strategy '{}'", name))
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityCheck, Principal, StaticIdentityStore};
    use crate::domains;
    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "registry-secret";

    struct BrokenStore;

    #[async_trait]
    impl IdentityCheck for BrokenStore {
        async fn check(&self, _class: CallerClass, _credentials: &Credentials) -> Result<bool> {
            Err(GatewayError::AuthMechanism("connection refused".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn registry() -> StrategyRegistry {
        let store = StaticIdentityStore::new()
            .with_account(CallerClass::Guest, "guest-1", "pw")
            .with_account(CallerClass::Bot, "bot-1", "bot-pw");
        let credentials = Arc::new(CredentialValidator::uniform(Arc::new(store)));
        let tokens = Arc::new(TokenValidator::new(SECRET).unwrap());
        let domains = domains::resolve("talky.io").unwrap();
        StrategyRegistry::standard(credentials, tokens, &domains).unwrap()
    }

    fn request(auth: Option<&str>, uri: &str) -> http::request::Parts {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn token(iss: &str) -> String {
        let claims = json!({
            "sub": "user-9",
            "iss": iss,
            "exp": chrono::Utc::now().timestamp() + 600,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_standard_names() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                "client-token",
                "prosody-api",
                "prosody-bots",
                "prosody-guests",
                "prosody-users"
            ]
        );
        assert_eq!(registry.len(), 5);

        let mut standard = StrategyRegistry::standard_names();
        standard.sort_unstable();
        assert_eq!(registry.names(), standard);
    }

    #[test]
    fn test_resolve_unknown_is_config_error() {
        let err = registry().resolve("prosody-admins").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("prosody-admins"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let tokens = Arc::new(TokenValidator::new(SECRET).unwrap());
        let result = registry.register(
            CLIENT_TOKEN_STRATEGY,
            AuthScheme::Token,
            Verifier::Token {
                validator: tokens,
                issuer: "api.talky.io".into(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_scheme_mismatch_rejected() {
        let mut registry = StrategyRegistry::new();
        let tokens = Arc::new(TokenValidator::new(SECRET).unwrap());
        let result = registry.register(
            "confused",
            AuthScheme::Basic,
            Verifier::Token {
                validator: tokens,
                issuer: "api.talky.io".into(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_challenge_and_realm() {
        let registry = registry();
        let guests = registry.resolve("prosody-guests").unwrap();
        assert_eq!(guests.scheme(), AuthScheme::Basic);
        assert_eq!(guests.challenge(), r#"Basic realm="guests""#);
        let token = registry.resolve(CLIENT_TOKEN_STRATEGY).unwrap();
        assert_eq!(token.challenge(), "Bearer");
    }

    #[tokio::test]
    async fn test_basic_strategy_accepts_class_account() {
        let registry = registry();
        let strategy = registry.resolve("prosody-bots").unwrap();
        let header = Credentials::new("bot-1", "bot-pw").to_basic_header();
        let verdict = strategy.authenticate(&request(Some(&header), "/")).await;
        match verdict {
            AuthVerdict::Accepted(Principal { id, class, .. }) => {
                assert_eq!(id, "bot-1");
                assert_eq!(class, Some(CallerClass::Bot));
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_basic_strategy_is_class_scoped() {
        let registry = registry();
        let strategy = registry.resolve("prosody-users").unwrap();
        let header = Credentials::new("bot-1", "bot-pw").to_basic_header();
        let verdict = strategy.authenticate(&request(Some(&header), "/")).await;
        assert!(matches!(
            verdict,
            AuthVerdict::Rejected(RejectReason::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_basic_strategy_missing_header() {
        let strategy = registry().resolve("prosody-guests").unwrap();
        let verdict = strategy.authenticate(&request(None, "/")).await;
        assert!(matches!(
            verdict,
            AuthVerdict::Rejected(RejectReason::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_basic_strategy_mechanism_error() {
        let credentials = Arc::new(CredentialValidator::uniform(Arc::new(BrokenStore)));
        let mut registry = StrategyRegistry::new();
        registry
            .register(
                "prosody-users",
                AuthScheme::Basic,
                Verifier::Credentials {
                    validator: credentials,
                    class: CallerClass::User,
                },
            )
            .unwrap();
        let header = Credentials::new("alice", "pw").to_basic_header();
        let verdict = registry
            .resolve("prosody-users")
            .unwrap()
            .authenticate(&request(Some(&header), "/"))
            .await;
        assert!(verdict.is_error());
    }

    #[tokio::test]
    async fn test_token_strategy_header_and_query() {
        let strategy = registry().resolve(CLIENT_TOKEN_STRATEGY).unwrap();
        let good = token("api.talky.io");

        let bearer = format!("Bearer {}", good);
        assert!(strategy
            .authenticate(&request(Some(&bearer), "/"))
            .await
            .is_accepted());
        assert!(strategy
            .authenticate(&request(Some(&good), "/"))
            .await
            .is_accepted());
        assert!(strategy
            .authenticate(&request(None, &format!("/rooms?x=1&token={}", good)))
            .await
            .is_accepted());
    }

    #[tokio::test]
    async fn test_token_strategy_binds_api_domain_as_issuer() {
        let strategy = registry().resolve(CLIENT_TOKEN_STRATEGY).unwrap();
        let foreign = format!("Bearer {}", token("talky.io"));
        let verdict = strategy.authenticate(&request(Some(&foreign), "/")).await;
        assert!(matches!(
            verdict,
            AuthVerdict::Rejected(RejectReason::IssuerMismatch)
        ));
    }

    #[tokio::test]
    async fn test_token_strategy_bearer_scheme_is_case_insensitive() {
        let strategy = registry().resolve(CLIENT_TOKEN_STRATEGY).unwrap();
        let good = token("api.talky.io");
        for scheme in ["BEARER", "bearer", "bEaReR"] {
            let header = format!("{} {}", scheme, good);
            assert!(
                strategy
                    .authenticate(&request(Some(&header), "/"))
                    .await
                    .is_accepted(),
                "scheme {}",
                scheme
            );
        }
    }

    #[test]
    fn test_extract_token_empty() {
        assert_eq!(extract_token(&request(Some("Bearer "), "/?token=")), None);
        assert_eq!(extract_token(&request(None, "/")), None);
    }

    #[test]
    fn test_extract_token_query_is_percent_decoded() {
        let parts = request(None, "/rooms?token=abc%2Edef%2Eghi&x=1");
        assert_eq!(extract_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let parts = http::Request::builder()
            .uri("/")
            .header("Cookie", "session=xyz; token=abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(extract_token(&parts).as_deref(), Some("abc.def.ghi"));

        // The header wins over the cookie
        let parts = http::Request::builder()
            .uri("/")
            .header("Authorization", "Bearer from-header")
            .header("Cookie", "token=from-cookie")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(extract_token(&parts).as_deref(), Some("from-header"));
    }
}
