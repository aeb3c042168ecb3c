//! Byte relay — raw bidirectional copy between two transports
//!
//! Opens plain TCP connections to the backend and relays bytes between an
//! upgraded client connection and the backend without inspecting them.

use super::target::TargetEndpoint;
use crate::error::{GatewayError, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Which side ended a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client stopped sending (EOF or error)
    Client,
    /// The backend stopped sending (EOF or error)
    Upstream,
    /// The gateway is shutting down
    Shutdown,
}

/// Summary of a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub end: RelayEnd,
    /// Bytes copied client→upstream, when that direction finished first
    pub bytes_sent: u64,
    /// Bytes copied upstream→client, when that direction finished first
    pub bytes_received: u64,
}

/// Relay bytes bidirectionally between two streams
///
/// Copies client→upstream and upstream→client concurrently until either
/// direction ends or shutdown is signalled. The other side's write half is
/// then shut down and both streams are dropped, so neither side is left
/// half-open.
pub async fn relay<C, U>(
    client: C,
    upstream: U,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RelayOutcome>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_upstream = tokio::io::copy(&mut client_read, &mut upstream_write);
    let upstream_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    let outcome = tokio::select! {
        result = client_to_upstream => {
            let _ = upstream_write.shutdown().await;
            let bytes_sent = result.map_err(|e| {
                GatewayError::Other(format!("relay client→upstream error: {}", e))
            })?;
            RelayOutcome { end: RelayEnd::Client, bytes_sent, bytes_received: 0 }
        }
        result = upstream_to_client => {
            let _ = client_write.shutdown().await;
            let bytes_received = result.map_err(|e| {
                GatewayError::Other(format!("relay upstream→client error: {}", e))
            })?;
            RelayOutcome { end: RelayEnd::Upstream, bytes_sent: 0, bytes_received }
        }
        _ = shutdown_signalled(&mut shutdown) => {
            let _ = upstream_write.shutdown().await;
            let _ = client_write.shutdown().await;
            RelayOutcome { end: RelayEnd::Shutdown, bytes_sent: 0, bytes_received: 0 }
        }
    };

    Ok(outcome)
}

/// Resolve once the shutdown flag flips to true. A dropped sender never
/// resolves: sessions outlive a gateway handle that was simply dropped.
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Open a fresh TCP connection to the backend
pub async fn connect_upstream(target: &TargetEndpoint) -> Result<TcpStream> {
    let address = target.authority();
    let stream = TcpStream::connect(&address).await.map_err(|e| {
        GatewayError::BackendUnavailable(format!(
            "connection to {} failed: {}",
            address, e
        ))
    })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}
