//! Upgrade proxy — bridges HTTP upgrade requests to the chat backend
//!
//! Every request carrying an `Upgrade` header is claimed here before any
//! routing or authentication. A claimed request walks one session through:
//!
//! ```text
//! Idle → Negotiating → Bridging → Streaming → Closed
//! ```
//!
//! Bridging opens exactly one fresh TCP connection to the backend, replays
//! the request head with a hyper client handshake and requires
//! `101 Switching Protocols`. Only then is the client answered with the
//! backend's 101 and both upgraded connections handed to the byte relay.
//! Any failure before that point closes the client connection without a
//! response.

use super::target::TargetEndpoint;
use super::tcp;
use crate::error::{GatewayError, Result};
use bytes::Bytes;
use http::header::{CONNECTION, UPGRADE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{Empty, Full};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle of one proxied connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Bridging,
    Streaming,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Negotiating => "negotiating",
            Self::Bridging => "bridging",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Session counters shared with the gateway health report
#[derive(Debug, Default)]
pub struct ProxyStats {
    active: AtomicUsize,
    total: AtomicU64,
    failed: AtomicU64,
}

impl ProxyStats {
    /// Sessions not yet closed
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Sessions ever opened
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Sessions that closed before reaching Streaming
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Check whether a request asks for a protocol upgrade at all
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
}

/// Check that a claimed upgrade request is a well-formed WebSocket handshake
pub fn check_upgrade_request(method: &Method, headers: &HeaderMap) -> Result<()> {
    if method != Method::GET {
        return Err(GatewayError::ProtocolViolation(format!(
            "upgrade requested with method {}",
            method
        )));
    }

    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !upgrade.trim().eq_ignore_ascii_case("websocket") {
        return Err(GatewayError::ProtocolViolation(format!(
            "unsupported upgrade protocol '{}'",
            upgrade
        )));
    }

    let connection_upgrades = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !connection_upgrades {
        return Err(GatewayError::ProtocolViolation(
            "Connection header does not list 'upgrade'".to_string(),
        ));
    }

    Ok(())
}

/// Client and backend ends of a streaming session
struct Transport<S> {
    client: S,
    upstream: S,
}

/// One upgraded connection. From Streaming on it owns both transport
/// handles; dropping it closes them and always lands in `Closed`.
struct ProxySession<S> {
    id: Uuid,
    state: SessionState,
    stats: Arc<ProxyStats>,
    transport: Option<Transport<S>>,
}

impl<S> ProxySession<S> {
    fn open(stats: Arc<ProxyStats>) -> Self {
        stats.active.fetch_add(1, Ordering::Relaxed);
        stats.total.fetch_add(1, Ordering::Relaxed);
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            stats,
            transport: None,
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "Session state");
        self.state = next;
    }

    /// Take ownership of both upgraded ends and start Streaming
    fn attach(&mut self, client: S, upstream: S) {
        self.transport = Some(Transport { client, upstream });
        self.transition(SessionState::Streaming);
    }
}

impl<S> ProxySession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Relay between the attached ends until either side closes or the
    /// gateway shuts down
    async fn relay(&mut self, shutdown: watch::Receiver<bool>) -> Result<tcp::RelayOutcome> {
        let transport = self.transport.as_mut().ok_or_else(|| {
            GatewayError::Other(format!("session {} has no transport attached", self.id))
        })?;
        tcp::relay(&mut transport.client, &mut transport.upstream, shutdown).await
    }
}

impl<S> Drop for ProxySession<S> {
    fn drop(&mut self) {
        if self.state != SessionState::Streaming {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.transport = None;
        self.transition(SessionState::Closed);
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Backend side of a completed handshake
struct BackendHandshake {
    response: Response<hyper::body::Incoming>,
    upgrade: OnUpgrade,
    // Kept alive until the upgrade resolves
    _sender: hyper::client::conn::http1::SendRequest<Empty<Bytes>>,
}

/// Claims upgrade requests and bridges them to one backend target
pub struct UpgradeProxy {
    target: TargetEndpoint,
    handshake_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ProxyStats>,
}

impl UpgradeProxy {
    pub fn new(
        target: TargetEndpoint,
        handshake_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            handshake_timeout,
            shutdown,
            stats: Arc::new(ProxyStats::default()),
        }
    }

    pub fn target(&self) -> &TargetEndpoint {
        &self.target
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Handle a claimed upgrade request.
    ///
    /// Returns the backend's 101 response on success; the relay then runs
    /// in its own task. An `Err` means the client connection must be closed
    /// without a response.
    pub async fn handle<B>(&self, mut req: Request<B>) -> Result<Response<Full<Bytes>>> {
        let mut session: ProxySession<TokioIo<Upgraded>> = ProxySession::open(self.stats.clone());
        session.transition(SessionState::Negotiating);

        if let Err(e) = check_upgrade_request(req.method(), req.headers()) {
            tracing::warn!(session = %session.id, error = %e, "Rejecting malformed upgrade");
            return Err(e);
        }

        let client_upgrade = hyper::upgrade::on(&mut req);
        let (parts, _) = req.into_parts();

        session.transition(SessionState::Bridging);
        let handshake = match tokio::time::timeout(self.handshake_timeout, self.bridge(&parts)).await
        {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => {
                tracing::warn!(
                    session = %session.id,
                    target = %self.target,
                    error = %e,
                    "Backend handshake failed"
                );
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    session = %session.id,
                    target = %self.target,
                    timeout_ms = self.handshake_timeout.as_millis() as u64,
                    "Backend handshake timed out"
                );
                return Err(GatewayError::BackendUnavailable(format!(
                    "handshake with {} timed out",
                    self.target
                )));
            }
        };

        let mut response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .body(Full::new(Bytes::new()))
            .map_err(|e| GatewayError::Other(format!("failed to build 101 response: {}", e)))?;
        *response.headers_mut() = handshake.response.headers().clone();

        let timeout = self.handshake_timeout;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            stream(session, client_upgrade, handshake, timeout, shutdown).await;
        });

        Ok(response)
    }

    /// Connect to the backend and replay the request head
    async fn bridge(&self, parts: &http::request::Parts) -> Result<BackendHandshake> {
        let stream = tcp::connect_upstream(&self.target).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| {
                GatewayError::BackendUnavailable(format!("HTTP handshake with backend: {}", e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                tracing::debug!(error = %e, "Backend connection ended");
            }
        });

        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut backend_req = Request::builder()
            .method(parts.method.clone())
            .uri(path)
            .version(parts.version)
            .body(Empty::<Bytes>::new())
            .map_err(|e| GatewayError::ProtocolViolation(format!("bad upgrade request: {}", e)))?;
        *backend_req.headers_mut() = parts.headers.clone();

        let mut response = sender.send_request(backend_req).await.map_err(|e| {
            GatewayError::BackendUnavailable(format!("backend dropped the handshake: {}", e))
        })?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(GatewayError::BackendUnavailable(format!(
                "backend refused upgrade with status {}",
                response.status()
            )));
        }

        let upgrade = hyper::upgrade::on(&mut response);
        Ok(BackendHandshake {
            response,
            upgrade,
            _sender: sender,
        })
    }
}

/// Finish both upgrades and relay until either side closes
async fn stream(
    mut session: ProxySession<TokioIo<Upgraded>>,
    client_upgrade: OnUpgrade,
    backend: BackendHandshake,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let BackendHandshake {
        upgrade: backend_upgrade,
        _sender: sender,
        ..
    } = backend;
    let upgrades = futures_util::future::try_join(client_upgrade, backend_upgrade);
    let (client, upstream) = match tokio::time::timeout(timeout, upgrades).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            tracing::warn!(session = %session.id, error = %e, "Upgrade failed");
            return;
        }
        Err(_) => {
            tracing::warn!(session = %session.id, "Upgrade timed out");
            return;
        }
    };
    drop(sender);

    session.attach(TokioIo::new(client), TokioIo::new(upstream));
    tracing::info!(session = %session.id, "Proxy session streaming");

    match session.relay(shutdown).await {
        Ok(outcome) => tracing::info!(
            session = %session.id,
            end = ?outcome.end,
            bytes_sent = outcome.bytes_sent,
            bytes_received = outcome.bytes_received,
            "Proxy session ended"
        ),
        Err(e) => tracing::debug!(session = %session.id, error = %e, "Proxy session ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::target::Scheme;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, v.parse().unwrap());
        }
        map
    }

    fn websocket_headers() -> HeaderMap {
        headers(&[("upgrade", "websocket"), ("connection", "Upgrade")])
    }

    #[test]
    fn test_is_upgrade_request() {
        assert!(!is_upgrade_request(&HeaderMap::new()));
        assert!(is_upgrade_request(&websocket_headers()));
        // Any upgrade is claimed, even ones later rejected
        assert!(is_upgrade_request(&headers(&[("Upgrade", "h2c")])));
    }

    #[test]
    fn test_check_valid_websocket_handshake() {
        assert!(check_upgrade_request(&Method::GET, &websocket_headers()).is_ok());
        let mixed = headers(&[("upgrade", "WebSocket"), ("connection", "keep-alive, Upgrade")]);
        assert!(check_upgrade_request(&Method::GET, &mixed).is_ok());
    }

    #[test]
    fn test_check_rejects_wrong_method() {
        let err = check_upgrade_request(&Method::POST, &websocket_headers()).unwrap_err();
        assert!(matches!(err, GatewayError::ProtocolViolation(_)));
    }

    #[test]
    fn test_check_rejects_other_protocols() {
        let h2c = headers(&[("upgrade", "h2c"), ("connection", "upgrade")]);
        assert!(matches!(
            check_upgrade_request(&Method::GET, &h2c),
            Err(GatewayError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_check_requires_connection_upgrade() {
        let missing = headers(&[("upgrade", "websocket")]);
        assert!(check_upgrade_request(&Method::GET, &missing).is_err());
        let keep_alive = headers(&[("upgrade", "websocket"), ("connection", "keep-alive")]);
        assert!(check_upgrade_request(&Method::GET, &keep_alive).is_err());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Bridging.to_string(), "bridging");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_session_drop_updates_stats() {
        let stats = Arc::new(ProxyStats::default());
        {
            let mut session: ProxySession<tokio::io::DuplexStream> =
                ProxySession::open(stats.clone());
            session.transition(SessionState::Negotiating);
            assert_eq!(stats.active(), 1);
        }
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total(), 1);
        assert_eq!(stats.failed(), 1);
    }

    #[tokio::test]
    async fn test_streaming_session_owns_and_closes_both_ends() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let stats = Arc::new(ProxyStats::default());
        let (client, mut client_peer) = tokio::io::duplex(1024);
        let (upstream, mut backend_peer) = tokio::io::duplex(1024);
        let (_tx, rx) = watch::channel(false);

        let mut session = ProxySession::open(stats.clone());
        session.attach(client, upstream);
        assert_eq!(session.state, SessionState::Streaming);
        assert!(session.transport.is_some());

        let task = tokio::spawn(async move {
            let outcome = session.relay(rx).await.unwrap();
            assert_eq!(session.state, SessionState::Streaming);
            outcome
        });

        client_peer.write_all(b"<open/>").await.unwrap();
        let mut buf = [0u8; 7];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"<open/>");

        drop(client_peer);
        let outcome = task.await.unwrap();
        assert_eq!(outcome.bytes_sent, 7);

        // The session was dropped with the task, taking the backend end with it
        let mut rest = Vec::new();
        backend_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total(), 1);
        assert_eq!(stats.failed(), 0);
    }

    #[tokio::test]
    async fn test_relay_without_transport_is_an_error() {
        let stats = Arc::new(ProxyStats::default());
        let (_tx, rx) = watch::channel(false);
        let mut session: ProxySession<tokio::io::DuplexStream> = ProxySession::open(stats);
        assert!(session.relay(rx).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_upgrade() {
        let (_tx, rx) = watch::channel(false);
        let target = TargetEndpoint::new(Scheme::Ws, "127.0.0.1", 1).unwrap();
        let proxy = UpgradeProxy::new(target, Duration::from_secs(1), rx);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/xmpp-websocket")
            .header("upgrade", "websocket")
            .header("connection", "upgrade")
            .body(())
            .unwrap();
        let err = proxy.handle(req).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProtocolViolation(_)));
        assert_eq!(proxy.stats().active(), 0);
    }

    #[tokio::test]
    async fn test_handle_unreachable_backend() {
        let (_tx, rx) = watch::channel(false);
        let target = TargetEndpoint::new(Scheme::Ws, "127.0.0.1", 1).unwrap();
        let proxy = UpgradeProxy::new(target, Duration::from_secs(2), rx);

        let req = Request::builder()
            .uri("/xmpp-websocket")
            .header("upgrade", "websocket")
            .header("connection", "upgrade")
            .body(())
            .unwrap();
        let err = proxy.handle(req).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable(_)));
        assert_eq!(proxy.stats().total(), 1);
        assert_eq!(proxy.stats().failed(), 1);
    }
}
