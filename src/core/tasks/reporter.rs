// src/core/tasks/reporter.rs

//! Periodic savings report task.

use crate::core::report;
use crate::core::storage::CacheStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::info;

/// Logs the savings report on a fixed interval.
pub struct ReporterTask {
    store: Arc<CacheStore>,
    interval: Duration,
    started: Instant,
}

impl ReporterTask {
    pub fn new(store: Arc<CacheStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            started: Instant::now(),
        }
    }

    /// The main run loop for the reporter task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            info!("periodic report disabled (interval = 0)");
            return;
        }
        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so the first report
        // carries a full interval of traffic.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = self.store.stats.snapshot();
                    let summary = self.store.summary().await;
                    info!("\n{}", report::render(&snapshot, &summary, self.started.elapsed()));
                }
                _ = shutdown_rx.recv() => {
                    info!("reporter task shutting down");
                    return;
                }
            }
        }
    }
}
