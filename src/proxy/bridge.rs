use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::group::{Policy, TaskGroup};
use crate::proxy::close::{close_on_cancel, Closable};
use crate::proxy::copy::copy_stream;

pub const CLIENT: &str = "client";
pub const UPSTREAM: &str = "upstream";
pub const CLIENT_TO_UPSTREAM: &str = "client->upstream";
pub const UPSTREAM_TO_CLIENT: &str = "upstream->client";

/// Relay bytes between `client` and `upstream` in both directions.
///
/// Returns as soon as either direction finishes, whether at end of stream,
/// because a peer hung up, or with an error, or when `parent` is cancelled.
/// Both streams are closed before this returns. Closures caused by a peer
/// hanging up or by cancellation are not errors; any other failures from
/// copying or closing are returned, several of them as one aggregated error.
pub async fn bridge<A, B>(parent: &CancellationToken, client: A, upstream: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let group = TaskGroup::new(parent);

    let (client_rd, client_wr) = tokio::io::split(client);
    let (upstream_rd, upstream_wr) = tokio::io::split(upstream);
    let client_wr = Closable::new(client_wr);
    let upstream_wr = Closable::new(upstream_wr);

    let sink = upstream_wr.clone();
    group.spawn("copy client->upstream", Policy::CancelOnExit, move |token| {
        copy_stream(token, CLIENT_TO_UPSTREAM, UPSTREAM, client_rd, sink)
    });

    let sink = client_wr.clone();
    group.spawn("copy upstream->client", Policy::CancelOnExit, move |token| {
        copy_stream(token, UPSTREAM_TO_CLIENT, CLIENT, upstream_rd, sink)
    });

    group.spawn("close client", Policy::CancelOnError, move |token| {
        close_on_cancel(token, CLIENT, client_wr)
    });
    group.spawn("close upstream", Policy::CancelOnError, move |token| {
        close_on_cancel(token, UPSTREAM, upstream_wr)
    });

    group.wait().await.into_result()
}
