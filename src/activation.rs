//! Listening sockets handed to the process at startup.
//!
//! The relay never binds its own socket. It expects exactly one already
//! listening socket from a [`ListenerSource`], normally systemd socket
//! activation.

use std::net::TcpListener as StdTcpListener;

use listenfd::ListenFd;
use tokio::net::TcpListener;
use tracing::debug;

use crate::error::{Error, Result};

pub trait ListenerSource {
    /// Take every socket this source provides. Later calls return nothing.
    fn listeners(&mut self) -> Result<Vec<StdTcpListener>>;
}

/// Listeners supplied directly, for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticListeners(pub Vec<StdTcpListener>);

impl ListenerSource for StaticListeners {
    fn listeners(&mut self) -> Result<Vec<StdTcpListener>> {
        Ok(std::mem::take(&mut self.0))
    }
}

/// Sockets passed by systemd through `LISTEN_PID`/`LISTEN_FDS`.
///
/// Build it with [`SystemdActivation::from_env`] before starting the async
/// runtime: reading the activation variables also removes them from the
/// process environment.
pub struct SystemdActivation {
    fds: ListenFd,
}

impl SystemdActivation {
    pub fn from_env() -> Self {
        Self::from(ListenFd::from_env())
    }
}

impl From<ListenFd> for SystemdActivation {
    fn from(fds: ListenFd) -> Self {
        Self { fds }
    }
}

impl ListenerSource for SystemdActivation {
    fn listeners(&mut self) -> Result<Vec<StdTcpListener>> {
        let count = self.fds.len();
        debug!(count, "sockets passed by systemd");

        let mut listeners = Vec::with_capacity(count);
        for idx in 0..count {
            let listener = self
                .fds
                .take_tcp_listener(idx)
                .map_err(|e| Error::Activation(format!("passed socket {idx} is not a TCP listener: {e}")))?;
            listeners.extend(listener);
        }
        Ok(listeners)
    }
}

/// Take the single listener `source` provides and register it with tokio.
///
/// Must be called from within a tokio runtime.
pub fn single_listener<S>(source: &mut S) -> Result<TcpListener>
where
    S: ListenerSource + ?Sized,
{
    let mut listeners = source.listeners()?;
    if listeners.len() != 1 {
        return Err(Error::Config(format!(
            "expected exactly one listening socket, got {}",
            listeners.len()
        )));
    }

    let listener = listeners.remove(0);
    listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(listener)?)
}
