use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{is_benign_closure, Error, Result};
use crate::proxy::close::Closable;

/// Copy `src` into `dst` until `src` reaches end of stream, the copy fails,
/// or `token` is cancelled.
///
/// On end of stream `dst` is shut down so its peer sees the same EOF. A copy
/// that ends because either stream was closed under it counts as a clean
/// completion; only other I/O failures are returned.
pub async fn copy_stream<R, W>(
    token: CancellationToken,
    direction: &'static str,
    sink: &'static str,
    mut src: R,
    dst: Closable<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut slot = dst.lock().await;
    let Some(writer) = slot.as_mut() else {
        // Closed before we got to it.
        return Ok(());
    };

    let copied = tokio::select! {
        result = tokio::io::copy(&mut src, writer) => result,
        _ = token.cancelled() => {
            debug!(direction, "copy stopped by cancellation");
            return Ok(());
        }
    };

    match copied {
        Ok(bytes) => {
            debug!(direction, bytes, "copy reached end of stream");
            drop(slot);
            match dst.close().await {
                Ok(_) => Ok(()),
                Err(e) if is_benign_closure(&e) => Ok(()),
                Err(e) => Err(Error::Close {
                    stream: sink,
                    source: e,
                }),
            }
        }
        Err(e) if is_benign_closure(&e) => {
            debug!(direction, error = %e, "copy ended by closed stream");
            Ok(())
        }
        Err(e) => Err(Error::Copy {
            direction,
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadBuf};
    use tokio::time::timeout;

    use super::*;

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "device unplugged")))
        }
    }

    #[tokio::test]
    async fn copies_everything_then_propagates_eof() {
        let (mut client, src) = tokio::io::duplex(16);
        let (dst, mut server) = tokio::io::duplex(16);
        let token = CancellationToken::new();
        let task = tokio::spawn(copy_stream(token, "a->b", "b", src, Closable::new(dst)));

        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        timeout(Duration::from_secs(5), server.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, expected);

        writer.await.unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_pending_copy() {
        let (_client, src) = tokio::io::duplex(16);
        let (dst, _server) = tokio::io::duplex(16);
        let token = CancellationToken::new();
        let task = tokio::spawn(copy_stream(token.clone(), "a->b", "b", src, Closable::new(dst)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        token.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn writing_to_a_departed_peer_is_benign() {
        let (mut client, src) = tokio::io::duplex(64);
        let (dst, server) = tokio::io::duplex(64);
        drop(server);

        client.write_all(b"nobody is listening").await.unwrap();
        let result = copy_stream(CancellationToken::new(), "a->b", "b", src, Closable::new(dst)).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn unexpected_read_errors_are_reported() {
        let (dst, _server) = tokio::io::duplex(16);
        let result = copy_stream(
            CancellationToken::new(),
            "a->b",
            "b",
            BrokenReader,
            Closable::new(dst),
        )
        .await;

        match result {
            Err(Error::Copy { direction, source }) => {
                assert_eq!(direction, "a->b");
                assert_eq!(source.kind(), io::ErrorKind::Other);
            }
            other => panic!("expected copy error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_closed_sink_is_a_no_op() {
        let (_client, src) = tokio::io::duplex(16);
        let (dst, _server) = tokio::io::duplex(16);
        let dst = Closable::new(dst);
        dst.close().await.unwrap();

        let result = copy_stream(CancellationToken::new(), "a->b", "b", src, dst).await;
        assert!(result.is_ok());
    }
}
