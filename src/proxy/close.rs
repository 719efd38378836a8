use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{is_benign_closure, Error, Result};

/// A resource that can be closed asynchronously.
pub trait Close: Send {
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

impl<W> Close for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

/// Handle to a resource shared between the task using it and the task that
/// closes it. The resource is closed at most once; afterwards the slot is
/// empty and further closes are no-ops.
#[derive(Debug)]
pub struct Closable<C>(Arc<Mutex<Option<C>>>);

impl<C> Clone for Closable<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C: Close> Closable<C> {
    pub fn new(resource: C) -> Self {
        Self(Arc::new(Mutex::new(Some(resource))))
    }

    /// Borrow the resource. `None` once it has been closed.
    pub async fn lock(&self) -> MutexGuard<'_, Option<C>> {
        self.0.lock().await
    }

    /// Close and drop the resource. Returns `false` if it was already closed.
    pub async fn close(&self) -> io::Result<bool> {
        let taken = self.0.lock().await.take();
        match taken {
            Some(mut resource) => resource.close().await.map(|()| true),
            None => Ok(false),
        }
    }
}

/// Wait for `token` to be cancelled, then close `target`. Closing a stream
/// whose peer is already gone is not an error.
pub async fn close_on_cancel<C: Close>(
    token: CancellationToken,
    name: &'static str,
    target: Closable<C>,
) -> Result<()> {
    token.cancelled().await;

    match target.close().await {
        Ok(_) => Ok(()),
        Err(e) if is_benign_closure(&e) => Ok(()),
        Err(e) => Err(Error::Close {
            stream: name,
            source: e,
        }),
    }
}
