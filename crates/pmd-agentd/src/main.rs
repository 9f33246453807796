mod config;

use std::path::Path;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pmd_core::{ProcessManager, StartupTree};
use pmd_model::Startup;
use pmd_observe::{Console, logger_init};
use pmd_prometheus::PrometheusSink;

use crate::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // 1) Configuration + logger
    let cfg = AgentConfig::load()?;
    logger_init(&cfg.logger)?;
    info!(format = %cfg.logger.format, level = %cfg.logger.level, "logger initialized");

    // 2) Process manager + factories
    let pm = ProcessManager::new(cfg.pm.clone());
    pmd_exec::register_defaults(&pm);

    // 3) Handlers
    Console::attach(&pm);
    let sink = PrometheusSink::new()?;
    pm.add_stats_flush_handler(move |snapshot| sink.record(snapshot));

    // 4) Start admission
    let token = CancellationToken::new();
    let admission = pm.start(token.clone())?;
    info!(max_jobs = pm.config().max_jobs(), "process manager ready");

    // 5) Boot
    if let Some(path) = &cfg.startup {
        let entries = load_startup(path).await?;
        let (tree, errors) = StartupTree::new(entries);
        for e in &errors {
            error!(error = %e, "startup entry skipped");
        }
        info!(entries = tree.len(), skipped = errors.len(), "booting");

        let booting = pm.clone();
        tokio::spawn(async move { booting.boot(&tree).await });
    }

    // 6) Run until signalled
    shutdown_signal().await?;
    info!("shutting down...");
    pm.kill_all();
    token.cancel();
    if let Err(e) = admission.await {
        warn!(error = %e, "admission loop ended abnormally");
    }

    Ok(())
}

async fn load_startup(path: &Path) -> Result<Vec<Startup>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("read startup batch {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse startup batch {}", path.display()))
}

async fn shutdown_signal() -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("wait for SIGINT")?,
        _ = term.recv() => {}
    }
    Ok(())
}
