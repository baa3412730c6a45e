use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use snapmock_daemon::{DaemonConfig, MockDaemon};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "snapmock-daemon", version, about = "In-memory mock of the snap daemon REST API")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8181
    #[arg(long, default_value = "127.0.0.1:8181")]
    listen: SocketAddr,

    /// JSON fixture seeding installed snaps, store snaps, interfaces and connections.
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Polls each simulated task needs before it completes.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    progress_total: u32,

    /// Whether the simulated host is classic. Defaults to the fixture's
    /// system info, or true.
    #[arg(long)]
    on_classic: Option<bool>,

    /// Reject every mutating action with auth-cancelled.
    #[arg(long, default_value_t = false)]
    decline_auth: bool,

    /// Daemon version reported by /v2/system-info. Defaults to the
    /// fixture's system info, or 2.61.
    #[arg(long)]
    daemon_version: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    fmt().with_target(false).with_env_filter(filter).init();

    let config = DaemonConfig {
        listen: cli.listen,
        on_classic: cli.on_classic,
        decline_auth: cli.decline_auth,
        progress_total: cli.progress_total,
        version: cli.daemon_version,
        fixture: cli.fixture,
    };
    info!("starting mock daemon with config: {:?}", config);

    let store = config.build_store()?;
    let daemon = MockDaemon::start(&config, store).context("starting mock daemon")?;
    info!("listening on {}", daemon.base_url());

    shutdown_signal().await;
    tokio::task::spawn_blocking(move || daemon.stop()).await??;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
