use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn, Instrument};

use crate::config::Destination;
use crate::error::{Error, Result};
use crate::group::{Policy, TaskGroup};
use crate::proxy::forwarder;

/// Accept connections until the group's scope is cancelled, relaying each one
/// to `destination` in its own task within `group`.
///
/// Cancellation drops the listener, which closes it, and returns `Ok`. Any
/// accept error other than an aborted handshake ends the loop with
/// [`Error::Accept`].
pub async fn run(listener: TcpListener, destination: Arc<Destination>, group: TaskGroup) -> Result<()> {
    let token = group.token();
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, destination = %destination, "relay listening");
    }

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = token.cancelled() => break,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => {
                warn!(error = %e, "client went away before accept completed");
                continue;
            }
            Err(e) => return Err(Error::Accept(e)),
        };

        debug!(peer = %peer, "accepted connection");

        let destination = Arc::clone(&destination);
        let span = tracing::debug_span!("connection", peer = %peer);
        group.spawn("connection", Policy::Isolated, move |token| {
            async move {
                forwarder::forward(token, stream, peer, &destination).await;
                Ok::<_, Error>(())
            }
            .instrument(span)
        });
    }

    drop(listener);
    info!("listener closed");
    Ok(())
}
