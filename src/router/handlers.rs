//! Built-in handlers

use super::{error_response, json_response, Handler};
use crate::auth::Principal;
use crate::HealthStatus;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;

/// Echoes the authenticated principal as JSON
pub struct PrincipalHandler;

#[async_trait]
impl Handler for PrincipalHandler {
    async fn handle(
        &self,
        _parts: &http::request::Parts,
        _body: Bytes,
        principal: Option<&Principal>,
    ) -> Response<Full<Bytes>> {
        match principal {
            Some(principal) => json_response(StatusCode::OK, principal),
            None => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
        }
    }
}

/// Reports gateway health
pub struct HealthHandler {
    status: Box<dyn Fn() -> HealthStatus + Send + Sync>,
}

impl HealthHandler {
    pub fn new(status: impl Fn() -> HealthStatus + Send + Sync + 'static) -> Self {
        Self {
            status: Box::new(status),
        }
    }
}

#[async_trait]
impl Handler for HealthHandler {
    async fn handle(
        &self,
        _parts: &http::request::Parts,
        _body: Bytes,
        _principal: Option<&Principal>,
    ) -> Response<Full<Bytes>> {
        json_response(StatusCode::OK, &(self.status)())
    }
}
