// src/core/report.rs

//! Renders the periodic savings report from engine statistics.

use crate::core::storage::engine::StoreSummary;
use crate::core::storage::stats::StatsSnapshot;
use std::fmt::Write;
use std::time::Duration;

/// How many URL prefixes the report lists.
const TOP_PREFIX_LINES: usize = 10;

/// Builds the multi-line report logged periodically and on shutdown.
pub fn render(stats: &StatsSnapshot, store: &StoreSummary, uptime: Duration) -> String {
    let mut out = String::new();
    let served_from_cache = stats.hits + stats.revalidations + stats.doc_hits;
    let total = served_from_cache + stats.misses + stats.doc_misses;
    let ratio = if total > 0 {
        served_from_cache as f64 * 100.0 / total as f64
    } else {
        0.0
    };

    let _ = writeln!(out, "=== edge cache report (up {}) ===", human_duration(uptime));
    let _ = writeln!(
        out,
        "requests: {total} | hits: {} | revalidated: {} | misses: {} | cache ratio: {ratio:.1}%",
        stats.hits, stats.revalidations, stats.misses
    );
    let _ = writeln!(
        out,
        "documents: {} served from cache, {} fetched",
        stats.doc_hits, stats.doc_misses
    );
    let _ = writeln!(
        out,
        "saved: {} body / {} wire | fetched: {} body / {} wire",
        human_bytes(stats.body_bytes_saved),
        human_bytes(stats.wire_bytes_saved),
        human_bytes(stats.miss_body_bytes),
        human_bytes(stats.miss_wire_bytes),
    );
    let _ = writeln!(
        out,
        "store: {} entries, {} aliases, {} ({} hot blobs, {} deduplicated, {} evicted)",
        store.entries,
        store.aliases,
        human_bytes(store.body_bytes),
        store.hot_blobs,
        store.dedup_marks,
        stats.evictions,
    );

    if !stats.per_origin.is_empty() {
        let _ = writeln!(out, "by origin:");
        for (origin, c) in &stats.per_origin {
            let _ = writeln!(
                out,
                "  {origin:<12} hits {} | reval {} | miss {} | saved {}",
                c.hits,
                c.revalidations,
                c.misses,
                human_bytes(c.body_bytes_saved)
            );
        }
    }
    if !stats.per_type.is_empty() {
        let _ = writeln!(out, "by resource type:");
        for (rt, c) in &stats.per_type {
            let _ = writeln!(
                out,
                "  {rt:<12} hits {} | reval {} | miss {} | saved {}",
                c.hits,
                c.revalidations,
                c.misses,
                human_bytes(c.body_bytes_saved)
            );
        }
    }
    if !stats.top_prefixes.is_empty() {
        let _ = writeln!(out, "top URLs by bytes:");
        for (prefix, bytes) in stats.top_prefixes.iter().take(TOP_PREFIX_LINES) {
            let _ = writeln!(out, "  {:>10}  {prefix}", human_bytes(*bytes));
        }
    }
    out
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
