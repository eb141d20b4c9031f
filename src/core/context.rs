// src/core/context.rs

//! Shared wiring for the request pipeline.

use crate::config::Config;
use crate::core::classifier::TrafficClassifier;
use crate::core::normalizer::UrlNormalizer;
use crate::core::storage::CacheStore;
use std::sync::Arc;

/// Everything one handler invocation needs. Built once at startup and
/// threaded through; there is no process-global state.
#[derive(Debug)]
pub struct Context {
    pub classifier: TrafficClassifier,
    pub normalizer: UrlNormalizer,
    pub store: Arc<CacheStore>,
}

impl Context {
    pub fn new(config: &Config, store: Arc<CacheStore>) -> Self {
        Self {
            classifier: TrafficClassifier::new(
                &config.bypass.auction_patterns,
                &config.bypass.beacon_patterns,
            ),
            normalizer: UrlNormalizer,
            store,
        }
    }
}
