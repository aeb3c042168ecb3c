//! Router — exact method + path route table
//!
//! Each route names an optional auth strategy and a handler. Strategy
//! names are resolved against the registry when the table is built, so an
//! unknown name fails at startup instead of on the first request.

mod handlers;

pub use handlers::{HealthHandler, PrincipalHandler};

use crate::auth::{Principal, Strategy, StrategyRegistry};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Request handler behind a route
#[async_trait]
pub trait Handler: Send + Sync {
    /// Serve one request. `principal` is set when the route is authenticated.
    async fn handle(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
        principal: Option<&Principal>,
    ) -> Response<Full<Bytes>>;
}

/// A route table entry
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    /// Auth strategy name; `None` serves the route unauthenticated
    pub strategy: Option<String>,
    pub handler: Arc<dyn Handler>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            method,
            path: path.into(),
            strategy: None,
            handler,
        }
    }

    /// Require the named strategy for this route
    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = Some(name.into());
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// A route with its strategy resolved
pub struct CompiledRoute {
    method: Method,
    path: String,
    strategy: Option<Arc<Strategy>>,
    handler: Arc<dyn Handler>,
}

impl CompiledRoute {
    pub fn strategy(&self) -> Option<&Arc<Strategy>> {
        self.strategy.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

/// Route table — read-only after construction
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Build the table, resolving every strategy name
    pub fn new(routes: Vec<Route>, registry: &StrategyRegistry) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(routes.len());

        for route in routes {
            if !route.path.starts_with('/') {
                return Err(GatewayError::InvalidConfig(format!(
                    "route path '{}' must start with '/'",
                    route.path
                )));
            }
            if !seen.insert((route.method.clone(), route.path.clone())) {
                return Err(GatewayError::InvalidConfig(format!(
                    "duplicate route {} {}",
                    route.method, route.path
                )));
            }

            let strategy = match &route.strategy {
                Some(name) => Some(registry.resolve(name)?),
                None => None,
            };

            compiled.push(CompiledRoute {
                method: route.method,
                path: route.path,
                strategy,
                handler: route.handler,
            });
        }

        Ok(Self { routes: compiled })
    }

    /// Find the route for a method and path
    pub fn find(&self, method: &Method, path: &str) -> Option<&CompiledRoute> {
        self.routes
            .iter()
            .find(|r| r.method == *method && r.path == path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// (method, path, strategy) for every route, for startup logs
    pub fn describe(&self) -> Vec<(String, String, Option<String>)> {
        self.routes
            .iter()
            .map(|r| {
                (
                    r.method.to_string(),
                    r.path.clone(),
                    r.strategy.as_ref().map(|s| s.name().to_string()),
                )
            })
            .collect()
    }
}

/// JSON response helper
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(body).unwrap_or_default();
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

/// JSON `{"error": message}` response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        CredentialValidator, StaticIdentityStore, TokenValidator, CLIENT_TOKEN_STRATEGY,
    };
    use crate::domains;

    fn registry() -> StrategyRegistry {
        let domains = domains::resolve("talky.io").unwrap();
        let credentials = Arc::new(CredentialValidator::uniform(Arc::new(
            StaticIdentityStore::new(),
        )));
        let tokens = Arc::new(TokenValidator::new("secret").unwrap());
        StrategyRegistry::standard(credentials, tokens, &domains).unwrap()
    }

    fn principal_route(path: &str) -> Route {
        Route::new(Method::GET, path, Arc::new(PrincipalHandler))
    }

    #[test]
    fn test_exact_match() {
        let table = RouteTable::new(
            vec![
                principal_route("/prosody/auth/bots").with_strategy("prosody-bots"),
                Route::new(Method::POST, "/rooms", Arc::new(PrincipalHandler))
                    .with_strategy(CLIENT_TOKEN_STRATEGY),
            ],
            &registry(),
        )
        .unwrap();
        assert_eq!(table.len(), 2);

        let route = table.find(&Method::GET, "/prosody/auth/bots").unwrap();
        assert_eq!(route.strategy().unwrap().name(), "prosody-bots");

        assert!(table.find(&Method::GET, "/prosody/auth/bots/").is_none());
        assert!(table.find(&Method::GET, "/prosody/auth").is_none());
        assert!(table.find(&Method::GET, "/rooms").is_none());
        assert!(table.find(&Method::POST, "/rooms").is_some());
    }

    #[test]
    fn test_unknown_strategy_is_config_error() {
        let result = RouteTable::new(
            vec![principal_route("/admin").with_strategy("prosody-admins")],
            &registry(),
        );
        match result {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let result = RouteTable::new(
            vec![principal_route("/a"), principal_route("/a")],
            &registry(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(RouteTable::new(vec![principal_route("a")], &registry()).is_err());
    }

    #[test]
    fn test_describe() {
        let table = RouteTable::new(
            vec![principal_route("/who").with_strategy("prosody-users")],
            &registry(),
        )
        .unwrap();
        assert_eq!(
            table.describe(),
            vec![(
                "GET".to_string(),
                "/who".to_string(),
                Some("prosody-users".to_string())
            )]
        );
    }

    #[test]
    fn test_error_response() {
        let resp = error_response(StatusCode::NOT_FOUND, "Not found");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
