use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcp_relay::activation::SystemdActivation;
use tcp_relay::config::{Config, LogFormat};
use tcp_relay::error::Result;
use tcp_relay::Service;

fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.log_format);

    // Activation variables are read and cleared while the process is still
    // single-threaded.
    let source = SystemdActivation::from_env();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config, source)) {
        error!(error = %e, "tcp-relay exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config, mut source: SystemdActivation) -> Result<()> {
    let service = Service::start(&config, &mut source)?;
    info!(listen = %service.local_addr()?, destination = %config.destination, "tcp-relay started");

    service.run(shutdown_signal()).await?;
    info!("tcp-relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler, only Ctrl+C will stop the relay");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
