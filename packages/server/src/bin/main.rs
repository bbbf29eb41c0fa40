//! Process entry point: parses configuration, validates it, and serves
//! the hub until a shutdown signal arrives.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use socket_server::{Config, NetworkModule};

/// `sysexits.h` EX_CONFIG -- configuration error.
const EX_CONFIG: i32 = 78;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(config.debug);

    if let Err(message) = config.validate() {
        error!(%message, "invalid configuration");
        std::process::exit(EX_CONFIG);
    }

    if let Err(err) = run(config).await {
        error!(error = %err, "server exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let mut module = NetworkModule::new(&config);
    let handler_bridge = module.handler_bridge();
    if let Err(err) = handler_bridge.ensure_payload_dir().await {
        error!(error = %err, "failed to create payload directory");
    }
    tokio::spawn(async move { handler_bridge.run_sweep().await });

    let port = module.start().await?;
    info!(%port, "socket-server listening");

    module.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
