use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};
use wharfd_models::{Config, EntryPoint};
use wharfd_supervisor::{bind_shared, PoolSettings, WorkerCommand, WorkerPool};

#[derive(Parser)]
#[command(name = "wharfd")]
#[command(about = "Pre-fork worker supervisor for WSGI applications")]
struct Args {
    /// host:port for the shared listening socket
    #[arg(long)]
    bind: Option<String>,

    /// Number of worker processes (falls back to WHARFD_WORKERS, then config)
    #[arg(long)]
    workers: Option<usize>,

    /// Bound in seconds on the graceful drain after a termination signal
    #[arg(long, value_name = "SECONDS")]
    graceful_timeout: Option<u64>,

    /// Path to a TOML config file
    #[arg(long, default_value = "configs/default.toml")]
    config: String,

    /// WSGI entry point, as module:object (e.g. abroad.wsgi:application)
    app: String,
}

/// Resolves on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = ctrl_c.await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        info!("Using default configuration ({e})");
        Config::default()
    });

    // Fail fast: an unparseable entry point never gets as far as a socket.
    let entry_point: EntryPoint = args.app.parse()?;
    let workers = config.resolve_workers(args.workers)?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let graceful_timeout = Duration::from_secs(
        args.graceful_timeout
            .unwrap_or(config.pool.graceful_timeout_seconds),
    );

    let listener = bind_shared(&bind)?;
    info!(%bind, workers, app = %entry_point, "Listening; starting worker pool");

    let command = WorkerCommand::for_wsgi(&config.runtime.python_bin, &entry_point, &config.runtime.env);
    let pool = WorkerPool::new(
        PoolSettings {
            workers,
            graceful_timeout,
        },
        listener,
        command,
    );

    let report = pool.run(shutdown_signal()).await?;
    info!(
        exited_clean = report.exited_clean,
        crashed = report.crashed,
        killed = report.killed,
        "Shutdown complete"
    );
    Ok(())
}
