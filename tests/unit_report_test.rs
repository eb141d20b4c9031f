use edgeproxy::core::report;
use edgeproxy::core::storage::engine::StoreSummary;
use edgeproxy::core::storage::stats::CacheStats;
use std::time::Duration;

#[test]
fn test_stats_accumulate_per_origin_and_type() {
    let stats = CacheStats::new();
    stats.hit("https://cdn.example/a.js", "script", "third-party", 100, 40);
    stats.hit("https://cdn.example/a.js", "script", "third-party", 100, 40);
    stats.revalidated("https://ads.example/c.gif", "image", "ad", 10, 10);
    stats.miss("https://cdn.example/b.css", "stylesheet", "third-party", 500, 200);
    stats.doc_hit("https://news.example/", "third-party", 1000, 300);
    stats.doc_miss("https://news.example/other", "third-party", 2000, 600);

    let snap = stats.snapshot();
    assert_eq!(snap.hits, 2);
    assert_eq!(snap.revalidations, 1);
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.doc_hits, 1);
    assert_eq!(snap.doc_misses, 1);
    assert_eq!(snap.body_bytes_saved, 100 + 100 + 10 + 1000);
    assert_eq!(snap.wire_bytes_saved, 40 + 40 + 10 + 300);
    assert_eq!(snap.miss_body_bytes, 500 + 2000);
    assert_eq!(snap.miss_wire_bytes, 200 + 600);

    let origins: Vec<&str> = snap.per_origin.iter().map(|(o, _)| o.as_str()).collect();
    assert_eq!(origins, vec!["ad", "third-party"]);
    let ad = &snap.per_origin[0].1;
    assert_eq!(ad.revalidations, 1);
    assert_eq!(ad.hits, 0);

    let types: Vec<&str> = snap.per_type.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(types, vec!["document", "image", "script", "stylesheet"]);
}

#[test]
fn test_top_prefixes_rank_by_cumulative_bytes() {
    let stats = CacheStats::new();
    stats.hit("https://big.example/blob", "media", "third-party", 5000, 5000);
    stats.hit("https://small.example/icon", "image", "third-party", 10, 10);
    stats.hit("https://big.example/blob", "media", "third-party", 5000, 5000);

    let snap = stats.snapshot();
    assert_eq!(snap.top_prefixes[0].0, "https://big.example/blob");
    assert_eq!(snap.top_prefixes[0].1, 10_000);
    assert_eq!(snap.top_prefixes[1].0, "https://small.example/icon");
}

#[test]
fn test_prefix_buckets_truncate_long_urls() {
    let stats = CacheStats::new();
    let long_url = format!("https://cdn.example/{}", "x".repeat(300));
    stats.hit(&long_url, "media", "third-party", 1, 1);
    let snap = stats.snapshot();
    assert_eq!(snap.top_prefixes[0].0.len(), 120);
}

#[test]
fn test_render_mentions_headline_figures() {
    let stats = CacheStats::new();
    stats.hit("https://cdn.example/a.js", "script", "third-party", 2048, 1024);
    stats.miss("https://cdn.example/b.js", "script", "third-party", 100, 50);

    let summary = StoreSummary {
        entries: 2,
        aliases: 1,
        hot_blobs: 2,
        body_bytes: 2148,
        dedup_marks: 0,
    };
    let text = report::render(&stats.snapshot(), &summary, Duration::from_secs(90));

    assert!(text.contains("hits: 1"));
    assert!(text.contains("misses: 1"));
    assert!(text.contains("2 entries"));
    assert!(text.contains("by origin:"));
    assert!(text.contains("third-party"));
    assert!(text.contains("1m30s"));
}

#[test]
fn test_render_with_no_traffic() {
    let stats = CacheStats::new();
    let text = report::render(
        &stats.snapshot(),
        &StoreSummary::default(),
        Duration::from_secs(5),
    );
    assert!(text.contains("cache ratio: 0.0%"));
}
