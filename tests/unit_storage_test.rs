use bytes::Bytes;
use edgeproxy::core::classifier::Origin;
use edgeproxy::core::storage::CacheStore;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn fresh_store(dir: &TempDir) -> CacheStore {
    let store = CacheStore::new(dir.path().to_path_buf(), 10 * 1024 * 1024, 60_000, 50);
    store.init().await.unwrap();
    store
}

fn count_blob_files(cache_dir: &Path) -> usize {
    let mut count = 0;
    let blobs = cache_dir.join("blobs");
    for shard in std::fs::read_dir(&blobs).unwrap() {
        let shard = shard.unwrap();
        if shard.file_type().unwrap().is_dir() {
            count += std::fs::read_dir(shard.path()).unwrap().count();
        }
    }
    count
}

#[tokio::test]
async fn test_put_then_peek_and_blob_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;

    store
        .put(
            "k1",
            "https://cdn.example/a.css",
            Bytes::from_static(b"body-bytes"),
            &headers(&[
                ("Content-Type", "text/css"),
                ("ETag", "\"v1\""),
                ("X-Powered-By", "origin"),
                ("Content-Encoding", "gzip"),
            ]),
            "stylesheet",
            Origin::ThirdParty,
            None,
        )
        .await
        .unwrap();

    let entry = store.peek_meta("k1").await.expect("entry stored");
    assert_eq!(entry.url, "https://cdn.example/a.css");
    assert_eq!(entry.size, 10);
    assert_eq!(entry.blob_hash.len(), 64);
    assert_eq!(entry.resource_type, "stylesheet");
    assert_eq!(entry.origin, "third-party");
    assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
    assert!(entry.has_validators());

    // Only whitelisted headers survive, lowercased.
    assert_eq!(entry.headers.get("content-type").map(String::as_str), Some("text/css"));
    assert!(!entry.headers.contains_key("x-powered-by"));
    assert!(!entry.headers.contains_key("content-encoding"));

    let body = store.get_blob(&entry.blob_hash).await.expect("blob present");
    assert_eq!(&body[..], b"body-bytes");
    assert!(store.is_fresh(&entry));
}

#[tokio::test]
async fn test_put_deduplicates_identical_bodies() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let body = Bytes::from_static(b"shared-body");

    store
        .put("k1", "https://a.example/x.js", body.clone(), &headers(&[]), "script", Origin::ThirdParty, None)
        .await
        .unwrap();
    store
        .put("k2", "https://b.example/y.js", body.clone(), &headers(&[]), "script", Origin::ThirdParty, None)
        .await
        .unwrap();

    let e1 = store.peek_meta("k1").await.unwrap();
    let e2 = store.peek_meta("k2").await.unwrap();
    assert_eq!(e1.blob_hash, e2.blob_hash);
    assert_eq!(count_blob_files(dir.path()), 1);

    let summary = store.summary().await;
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.hot_blobs, 1);
    assert_eq!(summary.dedup_marks, 1);
}

#[tokio::test]
async fn test_alias_resolution() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;

    store
        .put(
            "k1",
            "https://cdn.example/lib.js",
            Bytes::from_static(b"lib"),
            &headers(&[]),
            "script",
            Origin::ThirdParty,
            Some("alias|cdn.example/lib.js"),
        )
        .await
        .unwrap();

    let entry = store.peek_alias("alias|cdn.example/lib.js").await.unwrap();
    assert_eq!(entry.url, "https://cdn.example/lib.js");
    assert!(store.peek_alias("alias|cdn.example/other.js").await.is_none());
}

#[tokio::test]
async fn test_refresh_ttl_advances_stored_at() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    store
        .put("k1", "https://cdn.example/a.js", Bytes::from_static(b"a"), &headers(&[]), "script", Origin::ThirdParty, None)
        .await
        .unwrap();
    let before = store.peek_meta("k1").await.unwrap().stored_at;
    tokio::time::sleep(std::time::Duration::from_millis(15)).await;
    store.refresh_ttl("k1").await;
    let after = store.peek_meta("k1").await.unwrap().stored_at;
    assert!(after > before);
}

#[tokio::test]
async fn test_flush_writes_index_snapshots() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    store
        .put(
            "cafebabe",
            "https://cdn.example/a.js",
            Bytes::from_static(b"a"),
            &headers(&[]),
            "script",
            Origin::ThirdParty,
            Some("alias|cdn.example/a.js"),
        )
        .await
        .unwrap();
    store.flush().await.unwrap();

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("index.json")).unwrap()).unwrap();
    assert!(index.get("cafebabe").is_some());
    assert_eq!(index["cafebabe"]["resourceType"], "script");
    assert_eq!(index["cafebabe"]["origin"], "third-party");

    let aliases: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("alias-index.json")).unwrap())
            .unwrap();
    assert_eq!(aliases["alias|cdn.example/a.js"], "cafebabe");
}

#[tokio::test]
async fn test_reload_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = fresh_store(&dir).await;
        store
            .put("k1", "https://cdn.example/a.js", Bytes::from_static(b"persisted"), &headers(&[]), "script", Origin::ThirdParty, None)
            .await
            .unwrap();
        store.flush().await.unwrap();
    }

    let store = fresh_store(&dir).await;
    let entry = store.peek_meta("k1").await.expect("entry survives restart");
    let body = store.get_blob(&entry.blob_hash).await.unwrap();
    assert_eq!(&body[..], b"persisted");
}

#[tokio::test]
async fn test_startup_prunes_orphaned_entries() {
    let dir = TempDir::new().unwrap();
    let hash;
    {
        let store = fresh_store(&dir).await;
        store
            .put("k1", "https://cdn.example/a.js", Bytes::from_static(b"doomed"), &headers(&[]), "script", Origin::ThirdParty, None)
            .await
            .unwrap();
        hash = store.peek_meta("k1").await.unwrap().blob_hash;
        store.flush().await.unwrap();
    }

    // Simulate a lost blob file.
    std::fs::remove_file(dir.path().join("blobs").join(&hash[..2]).join(&hash)).unwrap();

    let store = fresh_store(&dir).await;
    assert!(store.peek_meta("k1").await.is_none());

    // The pruned index was persisted.
    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("index.json")).unwrap()).unwrap();
    assert!(index.get("k1").is_none());
}

#[tokio::test]
async fn test_corrupt_index_starts_fresh() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.json"), b"{not json").unwrap();
    std::fs::write(dir.path().join("alias-index.json"), b"[]").unwrap();

    let store = CacheStore::new(dir.path().to_path_buf(), 10 * 1024 * 1024, 60_000, 50);
    store.init().await.unwrap();
    assert_eq!(store.summary().await.entries, 0);
}

#[tokio::test]
async fn test_stale_horizon_lookups() {
    let dir = TempDir::new().unwrap();
    // One-millisecond freshness; the stale horizon floors at seven days.
    let store = CacheStore::new(dir.path().to_path_buf(), 10 * 1024 * 1024, 1, 50);
    store.init().await.unwrap();
    store
        .put("k1", "https://cdn.example/a.js", Bytes::from_static(b"a"), &headers(&[]), "script", Origin::ThirdParty, None)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let entry = store.peek_meta("k1").await.expect("peek_meta is unconditional");
    assert!(!store.is_fresh(&entry));
    assert!(
        store.peek_meta_allow_stale("k1").await.is_some(),
        "stale but inside the stale horizon"
    );
}

#[tokio::test]
async fn test_put_document_whitelist_and_labels() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    store
        .put_document(
            "doc1",
            "https://news.example/",
            Bytes::from_static(b"<html></html>"),
            &headers(&[
                ("Content-Type", "text/html"),
                ("Content-Security-Policy", "default-src 'self'"),
                ("Set-Cookie", "sid=1"),
                ("Server", "nginx"),
                ("Last-Modified", "Tue, 01 Jul 2025 00:00:00 GMT"),
            ]),
        )
        .await
        .unwrap();

    let entry = store.peek_meta("doc1").await.unwrap();
    assert_eq!(entry.resource_type, "document");
    assert_eq!(entry.origin, "document");
    assert!(entry.headers.contains_key("content-security-policy"));
    assert!(entry.headers.contains_key("set-cookie"));
    assert!(!entry.headers.contains_key("server"));
    assert_eq!(
        entry.last_modified.as_deref(),
        Some("Tue, 01 Jul 2025 00:00:00 GMT")
    );
}
