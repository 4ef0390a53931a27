use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;

use ember_miner::compute::{ComputeBackend, CpuBackend};
use ember_miner::config::Config;
use ember_miner::robot::Robot;
use ember_miner::tracing::{self, prelude::*};
use ember_miner::work::{LocalJobSource, WorkSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);
    let family = config.family()?;

    if let Some(pool) = &config.pool {
        anyhow::bail!(
            "pool mode ({}) requires a pool protocol client, which this build does not include",
            pool.url
        );
    }
    let source: Arc<dyn WorkSource> = Arc::new(LocalJobSource::new(
        Duration::from_secs(config.local.job_interval_secs),
        config.local.difficulty_bits,
    ));
    let backend: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new(config.devices.count, family));

    let running = CancellationToken::new();
    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::spawn({
        let running = running.clone();
        async move {
            tokio::select! {
                _ = sigint.recv() => {},
                _ = sigterm.recv() => {},
            }
            trace!("Shutting down.");
            running.cancel();
        }
    });

    let robot = Robot::new(config, backend, source, running)?;
    robot.run().await?;

    info!("Exiting.");
    Ok(())
}
