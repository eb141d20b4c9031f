// src/core/storage/stats.rs

//! Per-class statistics backing the periodic savings report.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bound on the number of distinct URL prefixes tracked for the report.
const MAX_TRACKED_PREFIXES: usize = 256;
/// Length of the URL prefix bucket key.
const PREFIX_LEN: usize = 120;

/// Counters for one origin label or resource type.
#[derive(Debug, Default)]
pub struct ClassCounters {
    pub hits: AtomicU64,
    pub revalidations: AtomicU64,
    pub misses: AtomicU64,
    pub body_bytes_saved: AtomicU64,
    pub wire_bytes_saved: AtomicU64,
}

impl ClassCounters {
    fn snapshot(&self) -> ClassSnapshot {
        ClassSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            body_bytes_saved: self.body_bytes_saved.load(Ordering::Relaxed),
            wire_bytes_saved: self.wire_bytes_saved.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data copy of [`ClassCounters`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassSnapshot {
    pub hits: u64,
    pub revalidations: u64,
    pub misses: u64,
    pub body_bytes_saved: u64,
    pub wire_bytes_saved: u64,
}

/// Holds all statistics the storage engine accumulates. `wire_bytes` is the
/// origin-advertised `Content-Length` when present, else the decoded body
/// length; it separates compressed-wire savings from decompressed-body
/// savings in the report.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub revalidations: AtomicU64,
    pub misses: AtomicU64,
    pub doc_hits: AtomicU64,
    pub doc_misses: AtomicU64,
    pub evictions: AtomicU64,
    pub body_bytes_saved: AtomicU64,
    pub wire_bytes_saved: AtomicU64,
    pub miss_body_bytes: AtomicU64,
    pub miss_wire_bytes: AtomicU64,
    per_origin: DashMap<String, ClassCounters>,
    per_type: DashMap<String, ClassCounters>,
    prefixes: DashMap<String, AtomicU64>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a body served straight from the store.
    pub fn hit(&self, url: &str, resource_type: &str, origin: &str, body_bytes: u64, wire_bytes: u64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
        self.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bump(origin, resource_type, |c| {
            c.hits.fetch_add(1, Ordering::Relaxed);
            c.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
            c.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        });
        self.track_prefix(url, body_bytes);
    }

    /// Records a body served after a 304 from the origin.
    pub fn revalidated(
        &self,
        url: &str,
        resource_type: &str,
        origin: &str,
        body_bytes: u64,
        wire_bytes: u64,
    ) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
        self.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
        self.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bump(origin, resource_type, |c| {
            c.revalidations.fetch_add(1, Ordering::Relaxed);
            c.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
            c.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        });
        self.track_prefix(url, body_bytes);
    }

    /// Records a body fetched from the origin (cacheable-class traffic only).
    pub fn miss(&self, url: &str, resource_type: &str, origin: &str, body_bytes: u64, wire_bytes: u64) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.miss_body_bytes.fetch_add(body_bytes, Ordering::Relaxed);
        self.miss_wire_bytes.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bump(origin, resource_type, |c| {
            c.misses.fetch_add(1, Ordering::Relaxed);
        });
        self.track_prefix(url, body_bytes);
    }

    /// Document variant of [`CacheStats::hit`].
    pub fn doc_hit(&self, url: &str, origin: &str, body_bytes: u64, wire_bytes: u64) {
        self.doc_hits.fetch_add(1, Ordering::Relaxed);
        self.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
        self.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bump(origin, "document", |c| {
            c.hits.fetch_add(1, Ordering::Relaxed);
            c.body_bytes_saved.fetch_add(body_bytes, Ordering::Relaxed);
            c.wire_bytes_saved.fetch_add(wire_bytes, Ordering::Relaxed);
        });
        self.track_prefix(url, body_bytes);
    }

    /// Document variant of [`CacheStats::miss`].
    pub fn doc_miss(&self, url: &str, origin: &str, body_bytes: u64, wire_bytes: u64) {
        self.doc_misses.fetch_add(1, Ordering::Relaxed);
        self.miss_body_bytes.fetch_add(body_bytes, Ordering::Relaxed);
        self.miss_wire_bytes.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bump(origin, "document", |c| {
            c.misses.fetch_add(1, Ordering::Relaxed);
        });
        self.track_prefix(url, body_bytes);
    }

    /// Atomically increments the eviction counter.
    pub fn increment_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    fn bump<F: Fn(&ClassCounters)>(&self, origin: &str, resource_type: &str, f: F) {
        f(&self.per_origin.entry(origin.to_string()).or_default());
        f(&self.per_type.entry(resource_type.to_string()).or_default());
    }

    /// Accumulates served bytes under a bounded 120-char URL prefix bucket.
    /// Once the bound is reached, unseen prefixes are no longer tracked.
    fn track_prefix(&self, url: &str, bytes: u64) {
        let prefix: String = url.chars().take(PREFIX_LEN).collect();
        if let Some(counter) = self.prefixes.get(&prefix) {
            counter.fetch_add(bytes, Ordering::Relaxed);
            return;
        }
        if self.prefixes.len() < MAX_TRACKED_PREFIXES {
            self.prefixes
                .entry(prefix)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Takes a consistent-enough copy of all counters for rendering.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut per_origin: Vec<(String, ClassSnapshot)> = self
            .per_origin
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        per_origin.sort_by(|a, b| a.0.cmp(&b.0));

        let mut per_type: Vec<(String, ClassSnapshot)> = self
            .per_type
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        per_type.sort_by(|a, b| a.0.cmp(&b.0));

        let mut top_prefixes: Vec<(String, u64)> = self
            .prefixes
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        top_prefixes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            doc_hits: self.doc_hits.load(Ordering::Relaxed),
            doc_misses: self.doc_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            body_bytes_saved: self.body_bytes_saved.load(Ordering::Relaxed),
            wire_bytes_saved: self.wire_bytes_saved.load(Ordering::Relaxed),
            miss_body_bytes: self.miss_body_bytes.load(Ordering::Relaxed),
            miss_wire_bytes: self.miss_wire_bytes.load(Ordering::Relaxed),
            per_origin,
            per_type,
            top_prefixes,
        }
    }
}

/// A plain-data copy of the statistics, consumed by the report formatter.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub revalidations: u64,
    pub misses: u64,
    pub doc_hits: u64,
    pub doc_misses: u64,
    pub evictions: u64,
    pub body_bytes_saved: u64,
    pub wire_bytes_saved: u64,
    pub miss_body_bytes: u64,
    pub miss_wire_bytes: u64,
    pub per_origin: Vec<(String, ClassSnapshot)>,
    pub per_type: Vec<(String, ClassSnapshot)>,
    pub top_prefixes: Vec<(String, u64)>,
}
