use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use disksurvey_monitor::{start_manager, SgDirLister};
use disksurvey_server::{start_server, DaemonConfig};
use disksurvey_sg::SgTransport;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

// One OS thread keeps every manager and worker suspension point
// cooperative; the blocking pool absorbs open/glob/snapshot syscalls.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = DaemonConfig::parse();

    let transport = Arc::new(SgTransport);
    let lister = Arc::new(SgDirLister::new(&cfg.device_dir));
    let (manager, manager_task) =
        start_manager(cfg.manager_config(), transport, lister).await;

    let server = start_server(cfg.listen, manager.clone())
        .await
        .with_context(|| format!("cannot bind http listener on {}", cfg.listen))?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigquit.recv() => {
                info!("received SIGQUIT, shutting down");
                break;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, snapshotting state");
                manager.trigger_snapshot();
            }
        }
    }

    server.shutdown().await;
    manager.shutdown();
    manager_task
        .await
        .context("disk manager task panicked")?
        .context("shutdown failed")?;
    Ok(())
}
