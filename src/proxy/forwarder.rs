use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Destination;
use crate::error::{is_benign_closure, Error, Result};
use crate::proxy::bridge::bridge;

/// Relay one accepted connection to `destination`.
///
/// Dials once. If the dial fails or is cancelled the accepted connection is
/// closed and abandoned. Otherwise both connections are bridged until they
/// finish or `token` is cancelled. Failures are logged, never returned, so
/// one bad connection cannot affect the others.
pub async fn forward(
    token: CancellationToken,
    mut client: TcpStream,
    peer: SocketAddr,
    destination: &Destination,
) {
    let dialed = tokio::select! {
        result = dial(destination) => result,
        _ = token.cancelled() => Err(Error::Dial {
            addr: destination.addr().to_string(),
            source: io::Error::new(io::ErrorKind::Interrupted, "shutdown in progress"),
        }),
    };

    let upstream = match dialed {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(peer = %peer, error = %e, "couldn't connect to destination, closing accepted connection");
            if let Err(e) = client.shutdown().await {
                if !is_benign_closure(&e) {
                    error!(peer = %peer, error = %e, "couldn't close accepted connection");
                }
            }
            return;
        }
    };

    client.set_nodelay(true).ok();
    upstream.set_nodelay(true).ok();
    debug!(peer = %peer, upstream = ?upstream.peer_addr().ok(), "bridging connection");

    match bridge(&token, client, upstream).await {
        Ok(()) => debug!(peer = %peer, "connection closed"),
        Err(e) => error!(peer = %peer, error = %e, "bridging failed"),
    }
}

/// Connect to the first reachable address `destination` resolves to within
/// its dial family.
pub async fn dial(destination: &Destination) -> Result<TcpStream> {
    let dial_error = |source| Error::Dial {
        addr: destination.addr().to_string(),
        source,
    };

    let family = destination.family();
    let candidates = lookup_host(destination.addr()).await.map_err(dial_error)?;

    let mut last_err = None;
    for addr in candidates.filter(|addr| family.admits(addr)) {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %addr, error = %e, "dial attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(dial_error(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {family} address found"),
        )
    })))
}
