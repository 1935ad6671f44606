//! portwait - block until a running Docker container's ports are reachable.

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use portwait::{
    DockerContainer, HostPortWaitStrategy, WaitConfig, WaitStrategy, container::connect_docker,
};

#[derive(Parser, Debug)]
#[command(name = "portwait")]
#[command(about = "Wait until a started container is listening on its ports")]
#[command(version)]
struct Cli {
    /// Container id or name
    container: String,

    /// Host port that must accept connections (repeatable; defaults to every mapped port)
    #[arg(short, long = "port")]
    ports: Vec<u16>,

    /// Overall startup timeout in seconds
    #[arg(short, long, env = "PORTWAIT_STARTUP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Minimum interval between readiness checks in milliseconds
    #[arg(long, env = "PORTWAIT_POLL_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Host address mapped ports are reachable on (defaults to the Docker host)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portwait=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = WaitConfig::resolve()?;
    if let Some(secs) = cli.timeout_secs {
        config = config.with_startup_timeout(Duration::from_secs(secs));
    }
    if let Some(ms) = cli.interval_ms {
        config = config.with_min_interval(Duration::from_millis(ms));
    }
    config.validate()?;

    let docker = connect_docker().await?;
    let mut container = DockerContainer::inspect(docker, &cli.container).await?;
    if !cli.ports.is_empty() {
        container = container.with_liveness_ports(cli.ports);
    }
    if let Some(host) = cli.host {
        container = container.with_host(host);
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, aborting wait");
            trigger.cancel();
        }
    });

    HostPortWaitStrategy::with_config(config)
        .with_cancellation(cancel)
        .wait_until_ready(&container)
        .await?;

    Ok(())
}
