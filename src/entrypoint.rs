//! Entrypoint — the HTTP/HTTPS listener
//!
//! Accepts connections, serves each one with hyper in its own task and
//! dispatches requests: upgrade requests go straight to the upgrade proxy,
//! everything else through the route table and its auth strategy.

use crate::auth::AuthVerdict;
use crate::config::TlsConfig;
use crate::error::{GatewayError, Result};
use crate::proxy::tcp::shutdown_signalled;
use crate::proxy::{is_upgrade_request, UpgradeProxy};
use crate::router::{error_response, RouteTable};
use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Largest request body a route handler receives
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared, read-only state for request handling
pub(crate) struct ListenerState {
    pub routes: RouteTable,
    pub proxy: UpgradeProxy,
}

/// Bind the listener and spawn its accept loop
pub(crate) async fn start_listener(
    addr: SocketAddr,
    tls_config: Option<&TlsConfig>,
    state: Arc<ListenerState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let tls_acceptor = match tls_config {
        Some(tls) => Some(crate::proxy::tls::build_tls_acceptor(tls)?),
        None => None,
    };

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Other(format!("Failed to bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        tls = tls_acceptor.is_some(),
        "Listener started"
    );

    let handle = tokio::spawn(async move {
        let mut stop = shutdown.clone();
        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = shutdown_signalled(&mut stop) => {
                    tracing::info!(address = %local_addr, "Listener stopped");
                    break;
                }
            };

            let state = state.clone();
            let tls_acceptor = tls_acceptor.clone();
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                if let Some(acceptor) = tls_acceptor {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            serve_connection(tls_stream, remote_addr, state, shutdown).await
                        }
                        Err(e) => {
                            tracing::debug!(remote = %remote_addr, error = %e, "TLS handshake failed");
                        }
                    }
                } else {
                    serve_connection(stream, remote_addr, state, shutdown).await;
                }
            });
        }
    });

    Ok((local_addr, handle))
}

/// Serve one accepted connection until it closes, upgrades or the gateway
/// shuts down
async fn serve_connection<S>(
    stream: S,
    remote_addr: SocketAddr,
    state: Arc<ListenerState>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let conn = http1::Builder::new()
        .serve_connection(
            io,
            service_fn(move |req| handle_request(req, remote_addr, state.clone())),
        )
        .with_upgrades();
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown_signalled(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(remote = %remote_addr, error = %e, "Connection closed with error");
    }
}

/// Dispatch one request.
///
/// An `Err` makes hyper drop the connection without a response, which is
/// how failed upgrades are surfaced to the client.
async fn handle_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<ListenerState>,
) -> Result<Response<Full<Bytes>>> {
    if is_upgrade_request(req.headers()) {
        tracing::debug!(remote = %remote_addr, path = %req.uri().path(), "Upgrade request claimed");
        return state.proxy.handle(req).await;
    }

    let (parts, body) = req.into_parts();

    let Some(route) = state.routes.find(&parts.method, parts.uri.path()) else {
        return Ok(error_response(StatusCode::NOT_FOUND, "Not found"));
    };

    let principal = match route.strategy() {
        None => None,
        Some(strategy) => match strategy.authenticate(&parts).await {
            AuthVerdict::Accepted(principal) => Some(principal),
            AuthVerdict::Rejected(reason) => {
                tracing::debug!(
                    remote = %remote_addr,
                    strategy = strategy.name(),
                    reason = %reason,
                    "Authentication rejected"
                );
                let mut resp = error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
                if let Ok(challenge) = HeaderValue::from_str(&strategy.challenge()) {
                    resp.headers_mut()
                        .insert(http::header::WWW_AUTHENTICATE, challenge);
                }
                return Ok(resp);
            }
            AuthVerdict::Error(e) => {
                tracing::warn!(
                    remote = %remote_addr,
                    strategy = strategy.name(),
                    error = %e,
                    "Authentication mechanism failed"
                );
                return Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ));
            }
        },
    };

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(remote = %remote_addr, error = %e, "Failed to read request body");
            return Ok(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
    };

    Ok(route.handler().handle(&parts, body, principal.as_ref()).await)
}
