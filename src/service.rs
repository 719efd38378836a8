use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::activation::{single_listener, ListenerSource};
use crate::config::{Config, Destination};
use crate::error::Result;
use crate::group::{Policy, TaskGroup};
use crate::proxy::acceptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Draining => "draining",
            ServiceState::Stopped => "stopped",
        })
    }
}

/// Owns the listening socket and everything relayed through it.
pub struct Service {
    destination: Arc<Destination>,
    listener: TcpListener,
    state: Arc<watch::Sender<ServiceState>>,
}

impl Service {
    /// Take the listening socket from `source`. Fails with a configuration
    /// error unless exactly one socket is provided.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(config: &Config, source: &mut S) -> Result<Self>
    where
        S: ListenerSource + ?Sized,
    {
        let (state, _) = watch::channel(ServiceState::Starting);
        info!(destination = %config.destination, "relay starting");

        let listener = single_listener(source)?;

        Ok(Self {
            destination: Arc::new(config.destination.clone()),
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Relay connections until `shutdown` resolves or accepting fails.
    ///
    /// On shutdown the listener is closed and every open bridge is cancelled;
    /// this returns once all of them have closed their streams. The result is
    /// an error only if accepting failed for a reason other than shutdown.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Service {
            destination,
            listener,
            state,
        } = self;

        let root = CancellationToken::new();
        let group = TaskGroup::new(&root);

        transition(&state, ServiceState::Running);

        let connections = group.clone();
        group.spawn("accept loop", Policy::CancelOnExit, move |_| {
            acceptor::run(listener, destination, connections)
        });

        let watcher_state = Arc::clone(&state);
        group.spawn("shutdown watcher", Policy::CancelOnExit, move |token| async move {
            tokio::select! {
                _ = shutdown => info!("shutdown signal received, stopping..."),
                _ = token.cancelled() => {}
            }
            transition(&watcher_state, ServiceState::Draining);
            Ok(())
        });

        let result = group.wait().await.into_result();
        transition(&state, ServiceState::Stopped);
        result
    }
}

fn transition(state: &watch::Sender<ServiceState>, next: ServiceState) {
    let prev = state.send_replace(next);
    if prev != next {
        info!(from = %prev, to = %next, "service state changed");
    }
}
