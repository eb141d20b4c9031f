// src/core/storage/engine.rs

//! The content-addressable storage engine: blob store, metadata index, alias
//! index, deduplication, eviction, and debounced crash-safe persistence.
//!
//! All mutating operations run under one critical section (a single async
//! mutex over the in-memory state). The in-memory index is authoritative; the
//! on-disk `index.json` / `alias-index.json` pair is a snapshot that may lag
//! writes by up to the debounce window.

use super::entry::{
    ASSET_HEADER_WHITELIST, CacheEntry, DOCUMENT_HEADER_WHITELIST, filter_headers,
    lowercase_headers,
};
use super::stats::CacheStats;
use crate::core::classifier::Origin;
use crate::core::errors::EdgeError;
use crate::core::normalizer;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Eviction shrinks the store down to this fraction of `max_size`.
const EVICTION_LOW_WATERMARK: f64 = 0.9;
/// Entries older than `max(STALE_TTL_FACTOR x body_ttl, MIN_STALE_TTL_MS)`
/// are invisible to the validator-aware lookup.
const STALE_TTL_FACTOR: u64 = 30;
const MIN_STALE_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

const INDEX_FILE: &str = "index.json";
const ALIAS_INDEX_FILE: &str = "alias-index.json";
const BLOBS_DIR: &str = "blobs";

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Mutable engine state guarded by the single critical section.
#[derive(Debug, Default)]
struct StoreInner {
    /// Main index: hex cache-key to metadata entry.
    index: HashMap<String, CacheEntry>,
    /// Alias index: alias string to hex cache-key.
    aliases: HashMap<String, String>,
    /// Hot tier: hex blob hash to body bytes.
    blobs: HashMap<String, Bytes>,
    /// Keys whose `put` observed a pre-existing blob. Telemetry only.
    dedup_markers: HashSet<String>,
    dirty: bool,
}

/// Aggregate store figures for the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreSummary {
    pub entries: usize,
    pub aliases: usize,
    pub hot_blobs: usize,
    pub body_bytes: u64,
    pub dedup_marks: usize,
}

/// The persistent content-addressed cache. One instance owns the cache
/// directory exclusively.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    blobs_dir: PathBuf,
    max_size: u64,
    body_ttl_ms: u64,
    stale_ttl_ms: u64,
    debounce: Duration,
    inner: Mutex<StoreInner>,
    flush_signal: Notify,
    pub stats: CacheStats,
}

impl CacheStore {
    pub fn new(dir: PathBuf, max_size: u64, body_ttl_ms: u64, flush_debounce_ms: u64) -> Self {
        let blobs_dir = dir.join(BLOBS_DIR);
        Self {
            dir,
            blobs_dir,
            max_size,
            body_ttl_ms,
            stale_ttl_ms: (STALE_TTL_FACTOR.saturating_mul(body_ttl_ms)).max(MIN_STALE_TTL_MS),
            debounce: Duration::from_millis(flush_debounce_ms),
            inner: Mutex::new(StoreInner::default()),
            flush_signal: Notify::new(),
            stats: CacheStats::new(),
        }
    }

    pub fn body_ttl_ms(&self) -> u64 {
        self.body_ttl_ms
    }

    pub fn stale_ttl_ms(&self) -> u64 {
        self.stale_ttl_ms
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Signalled whenever the in-memory indices diverge from disk. The flush
    /// task sleeps the debounce window on it, then calls [`CacheStore::flush`].
    pub fn flush_signal(&self) -> &Notify {
        &self.flush_signal
    }

    /// Creates the directory tree, loads both indices (tolerating parse
    /// failures by starting fresh), pre-loads referenced blobs into the hot
    /// tier, prunes entries whose blob file is gone, and persists the pruned
    /// index. Idempotent.
    pub async fn init(&self) -> Result<(), EdgeError> {
        fs::create_dir_all(&self.blobs_dir).await?;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.index = load_json_map(&self.dir.join(INDEX_FILE)).await;
        inner.aliases = load_json_map(&self.dir.join(ALIAS_INDEX_FILE)).await;
        inner.blobs.clear();
        inner.dedup_markers.clear();

        let referenced: HashSet<String> = inner
            .index
            .values()
            .map(|entry| entry.blob_hash.clone())
            .collect();
        let mut missing: HashSet<String> = HashSet::new();
        for hash in referenced {
            match fs::read(self.blob_path(&hash)).await {
                Ok(bytes) => {
                    inner.blobs.insert(hash, Bytes::from(bytes));
                }
                Err(_) => {
                    missing.insert(hash);
                }
            }
        }

        let before = inner.index.len();
        inner
            .index
            .retain(|_, entry| !missing.contains(&entry.blob_hash));
        let orphaned = before - inner.index.len();
        if orphaned > 0 {
            warn!(
                orphaned,
                "dropped index entries whose blob was missing on disk"
            );
        }
        let index = &inner.index;
        inner.aliases.retain(|_, key| index.contains_key(key));

        self.write_indices_locked(inner).await?;
        info!(
            entries = inner.index.len(),
            aliases = inner.aliases.len(),
            "cache index loaded"
        );
        Ok(())
    }

    /// Returns the entry for `key` unconditionally. Non-destructive: never
    /// deletes stale entries; the revalidation path relies on this.
    pub async fn peek_meta(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().await.index.get(key).cloned()
    }

    /// Returns the entry iff it is younger than the stale horizon.
    pub async fn peek_meta_allow_stale(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.lock().await;
        let entry = inner.index.get(key)?;
        if now_ms().saturating_sub(entry.stored_at) < self.stale_ttl_ms {
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Resolves an alias string to its canonical entry. When the alias was
    /// never registered, the remainder of the alias string is hashed as a
    /// canonical of its own: a version-stamped request can then still find
    /// the entry stored for the bare URL.
    pub async fn peek_alias(&self, alias: &str) -> Option<CacheEntry> {
        let registered = {
            let inner = self.inner.lock().await;
            inner.aliases.get(alias).cloned()
        };
        let key = registered.unwrap_or_else(|| {
            normalizer::cache_key(alias.strip_prefix(normalizer::ALIAS_PREFIX).unwrap_or(alias))
        });
        self.peek_meta_allow_stale(&key).await
    }

    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        now_ms().saturating_sub(entry.stored_at) < self.body_ttl_ms
    }

    pub fn has_validators(&self, entry: &CacheEntry) -> bool {
        entry.has_validators()
    }

    /// Returns the body for a blob hash: hot tier first, then disk (loading
    /// the blob into the hot tier on the way).
    pub async fn get_blob(&self, hash: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock().await;
        if let Some(body) = inner.blobs.get(hash) {
            return Some(body.clone());
        }
        match fs::read(self.blob_path(hash)).await {
            Ok(bytes) => {
                let body = Bytes::from(bytes);
                inner.blobs.insert(hash.to_string(), body.clone());
                Some(body)
            }
            Err(_) => None,
        }
    }

    /// Refreshes an entry's freshness window after a successful revalidation.
    pub async fn refresh_ttl(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if let Some(entry) = inner.index.get_mut(key) {
            entry.stored_at = now_ms();
            inner.dirty = true;
            self.flush_signal.notify_one();
        }
    }

    /// Stores an asset body and its metadata under `key`, registering
    /// `alias_key` when given. Deduplicates bodies by content hash.
    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        key: &str,
        url: &str,
        body: Bytes,
        response_headers: &HashMap<String, String>,
        resource_type: &str,
        origin: Origin,
        alias_key: Option<&str>,
    ) -> Result<(), EdgeError> {
        self.store_entry(
            key,
            url,
            body,
            response_headers,
            resource_type,
            origin.as_str(),
            alias_key,
            ASSET_HEADER_WHITELIST,
            true,
        )
        .await
    }

    /// Document variant of [`CacheStore::put`]: resource type and origin are
    /// the `document` label and the document header whitelist applies.
    pub async fn put_document(
        &self,
        key: &str,
        url: &str,
        body: Bytes,
        response_headers: &HashMap<String, String>,
    ) -> Result<(), EdgeError> {
        self.store_entry(
            key,
            url,
            body,
            response_headers,
            "document",
            "document",
            None,
            DOCUMENT_HEADER_WHITELIST,
            false,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_entry(
        &self,
        key: &str,
        url: &str,
        body: Bytes,
        response_headers: &HashMap<String, String>,
        resource_type: &str,
        origin_label: &str,
        alias_key: Option<&str>,
        whitelist: &[&str],
        mark_dedup: bool,
    ) -> Result<(), EdgeError> {
        let hash = hex::encode(Sha256::digest(&body));
        let size = body.len() as u64;
        let lowered = lowercase_headers(response_headers);
        let headers = filter_headers(&lowered, whitelist);
        let etag = lowered.get("etag").cloned();
        let last_modified = lowered.get("last-modified").cloned();
        let vary = lowered.get("vary").cloned();

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.blobs.contains_key(&hash) {
            if mark_dedup {
                inner.dedup_markers.insert(key.to_string());
            }
        } else {
            // The blob write must land before the metadata is committed; a
            // failed write leaves the index untouched and the request is
            // served uncached.
            self.write_blob(&hash, &body).await?;
            inner.blobs.insert(hash.clone(), body.clone());
        }

        let entry = CacheEntry {
            url: url.to_string(),
            blob_hash: hash,
            stored_at: now_ms(),
            headers,
            etag,
            last_modified,
            vary,
            resource_type: resource_type.to_string(),
            origin: origin_label.to_string(),
            size,
        };
        inner.index.insert(key.to_string(), entry);
        if let Some(alias) = alias_key {
            inner.aliases.insert(alias.to_string(), key.to_string());
        }
        inner.dirty = true;
        self.flush_signal.notify_one();

        self.maybe_evict_locked(inner).await?;
        Ok(())
    }

    /// Pops oldest entries until total body bytes sit below the low
    /// watermark. Blobs are unlinked only once no surviving entry references
    /// their hash; unlink failures become the next startup's orphans.
    async fn maybe_evict_locked(&self, inner: &mut StoreInner) -> Result<(), EdgeError> {
        let mut total: u64 = inner.index.values().map(|entry| entry.size).sum();
        if total <= self.max_size {
            return Ok(());
        }
        let target = (self.max_size as f64 * EVICTION_LOW_WATERMARK) as u64;

        let mut by_age: Vec<(u64, String)> = inner
            .index
            .iter()
            .map(|(key, entry)| (entry.stored_at, key.clone()))
            .collect();
        by_age.sort();

        let mut evicted = 0u64;
        for (_, key) in by_age {
            if total <= target {
                break;
            }
            let Some(entry) = inner.index.remove(&key) else {
                continue;
            };
            total = total.saturating_sub(entry.size);
            evicted += 1;

            let hash = entry.blob_hash;
            let still_referenced = inner.index.values().any(|e| e.blob_hash == hash);
            if !still_referenced {
                inner.blobs.remove(&hash);
                if let Err(e) = fs::remove_file(self.blob_path(&hash)).await {
                    warn!("failed to unlink evicted blob {}: {}", hash, e);
                }
            }
        }
        let index = &inner.index;
        inner.aliases.retain(|_, key| index.contains_key(key));

        self.stats.increment_evictions(evicted);
        info!(evicted, total, "evicted entries to meet the size limit");
        self.write_indices_locked(inner).await
    }

    /// Writes both indices atomically if anything changed since the last
    /// snapshot. Must complete before process exit.
    pub async fn flush(&self) -> Result<(), EdgeError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.dirty {
            return Ok(());
        }
        self.write_indices_locked(inner).await
    }

    /// Aggregate figures for the report.
    pub async fn summary(&self) -> StoreSummary {
        let inner = self.inner.lock().await;
        StoreSummary {
            entries: inner.index.len(),
            aliases: inner.aliases.len(),
            hot_blobs: inner.blobs.len(),
            body_bytes: inner.index.values().map(|entry| entry.size).sum(),
            dedup_marks: inner.dedup_markers.len(),
        }
    }

    async fn write_indices_locked(&self, inner: &mut StoreInner) -> Result<(), EdgeError> {
        let index_json = serde_json::to_vec(&inner.index)?;
        let alias_json = serde_json::to_vec(&inner.aliases)?;
        atomic_write(&self.dir.join(INDEX_FILE), &index_json).await?;
        atomic_write(&self.dir.join(ALIAS_INDEX_FILE), &alias_json).await?;
        inner.dirty = false;
        debug!("cache indices flushed");
        Ok(())
    }

    async fn write_blob(&self, hash: &str, body: &Bytes) -> Result<(), EdgeError> {
        let path = self.blob_path(hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        atomic_write(&path, body).await
    }

    /// Sharded blob layout: `blobs/<first-2>/<hash>`.
    fn blob_path(&self, hash: &str) -> PathBuf {
        self.blobs_dir.join(&hash[..2]).join(hash)
    }
}

/// Write-to-temp-then-rename. The temp name carries the process id and a
/// random suffix so concurrent writers cannot collide.
async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), EdgeError> {
    let suffix: u32 = rand::random();
    let tmp = PathBuf::from(format!(
        "{}.tmp.{}.{suffix:08x}",
        path.display(),
        std::process::id()
    ));
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Loads a JSON object file, tolerating absence and parse failures by
/// starting fresh.
async fn load_json_map<T: serde::de::DeserializeOwned>(path: &Path) -> HashMap<String, T> {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "failed to parse {}, starting with an empty index: {}",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}
