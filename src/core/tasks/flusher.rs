// src/core/tasks/flusher.rs

//! Drives the storage engine's debounced index persistence.

use crate::core::storage::CacheStore;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Waits on the store's dirty signal, lets a put-storm settle for the
/// debounce window, then writes both index files in one pass. Dirty marks
/// landing inside the window coalesce into that single write.
pub struct FlushTask {
    store: Arc<CacheStore>,
}

impl FlushTask {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// The main run loop for the flush task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.store.flush_signal().notified() => {
                    tokio::time::sleep(self.store.debounce()).await;
                    if let Err(e) = self.store.flush().await {
                        warn!("debounced index flush failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    // The shutdown path performs the final flush itself.
                    info!("flush task shutting down");
                    return;
                }
            }
        }
    }
}
