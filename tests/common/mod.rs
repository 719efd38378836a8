//! Shared helpers for relay integration tests.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use tcp_relay::activation::StaticListeners;
use tcp_relay::config::{Config, DialFamily, Destination, LogFormat};
use tcp_relay::{Result, Service, ServiceState};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn config_for(destination: SocketAddr) -> Config {
    Config {
        destination: Destination::new(destination.to_string(), DialFamily::Any).unwrap(),
        log_format: LogFormat::Pretty,
    }
}

/// A relay running on a loopback socket.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub state: watch::Receiver<ServiceState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl RunningRelay {
    pub async fn start(destination: SocketAddr) -> Self {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        Self::start_on(listener, destination).await
    }

    pub async fn start_on(listener: StdTcpListener, destination: SocketAddr) -> Self {
        let mut source = StaticListeners(vec![listener]);
        let service = Service::start(&config_for(destination), &mut source).unwrap();
        let addr = service.local_addr().unwrap();
        let state = service.state();

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(service.run(async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            shutdown: Some(tx),
            handle,
        }
    }

    /// Signal shutdown and wait for the service to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    pub async fn join(self) -> Result<()> {
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("relay did not stop in time")
            .expect("relay task panicked")
    }
}

/// Bind a loopback listener standing in for the relay destination.
pub async fn destination() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nothing listens on.
pub fn closed_port() -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Destination that echoes every byte back until the peer closes.
#[allow(dead_code)]
pub async fn start_echo_destination() -> SocketAddr {
    let (listener, addr) = destination().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
                let _ = wr.shutdown().await;
            });
        }
    });

    addr
}

/// Read until EOF, failing the test if it takes longer than [`WAIT`].
pub async fn read_all<R: AsyncReadExt + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(WAIT, reader.read_to_end(&mut buf))
        .await
        .expect("peer did not close in time")
        .expect("read failed");
    buf
}
