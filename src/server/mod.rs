// src/server/mod.rs

//! Startup and shutdown orchestration for the proxy core.
//!
//! The browser automation frontend (out of scope here) drives
//! [`crate::core::handler::handle_request`] with the [`Context`] built by
//! [`bootstrap`]; this module owns everything around that: storage
//! initialization, background tasks, signal handling, and the final flush.

use crate::config::Config;
use crate::core::context::Context;
use crate::core::report;
use crate::core::storage::CacheStore;
use crate::core::tasks::flusher::FlushTask;
use crate::core::tasks::reporter::ReporterTask;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Builds the storage engine and context from configuration. A failed
/// storage `init` is fatal and becomes exit code 1 in `main`.
pub async fn bootstrap(config: &Config) -> Result<Arc<Context>> {
    let store = Arc::new(CacheStore::new(
        config.cache.dir.clone(),
        config.cache.max_size_bytes,
        config.cache.body_ttl_ms,
        config.cache.flush_debounce_ms,
    ));
    store.init().await?;
    Ok(Arc::new(Context::new(config, store)))
}

/// Runs the core until SIGINT/SIGTERM, then flushes and reports.
pub async fn run(config: Config) -> Result<()> {
    let started = Instant::now();
    let ctx = bootstrap(&config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);

    tokio::spawn(FlushTask::new(ctx.store.clone()).run(shutdown_tx.subscribe()));
    tokio::spawn(
        ReporterTask::new(
            ctx.store.clone(),
            Duration::from_secs(config.report.interval_secs),
        )
        .run(shutdown_tx.subscribe()),
    );

    info!(
        channel = %config.browser.channel,
        cache_dir = %config.cache.dir.display(),
        "edge proxy core ready, awaiting intercepted traffic"
    );

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    // Final report and index flush before exit.
    let snapshot = ctx.store.stats.snapshot();
    let summary = ctx.store.summary().await;
    info!("\n{}", report::render(&snapshot, &summary, started.elapsed()));
    ctx.store.flush().await?;
    info!("cache indices flushed, exiting");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
