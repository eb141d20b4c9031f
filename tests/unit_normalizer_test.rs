use edgeproxy::core::classifier::Origin;
use edgeproxy::core::normalizer::{UrlNormalizer, cache_key};

#[test]
fn test_canonical_sorts_and_lowercases() {
    let n = UrlNormalizer;
    let canonical = n.canonical("https://CDN.Example/a.js?b=2&a=1", Origin::ThirdParty);
    assert_eq!(canonical, "cdn.example/a.js?a=1&b=2");
}

#[test]
fn test_canonical_is_query_order_insensitive() {
    let n = UrlNormalizer;
    let a = n.canonical(
        "https://cdn.example/app.css?x=1&y=2&z=3",
        Origin::ThirdParty,
    );
    let b = n.canonical(
        "https://cdn.example/app.css?z=3&x=1&y=2",
        Origin::ThirdParty,
    );
    assert_eq!(a, b);
}

#[test]
fn test_canonical_preserves_duplicate_params() {
    let n = UrlNormalizer;
    let canonical = n.canonical("https://cdn.example/a.js?a=2&a=1", Origin::ThirdParty);
    assert_eq!(canonical, "cdn.example/a.js?a=1&a=2");
}

#[test]
fn test_canonical_drops_tracking_params() {
    let n = UrlNormalizer;
    let canonical = n.canonical(
        "https://cdn.example/a.js?utm_source=nl&utm_medium=mail&gclid=abc&a=1",
        Origin::ThirdParty,
    );
    assert_eq!(canonical, "cdn.example/a.js?a=1");
}

#[test]
fn test_canonical_ad_origin_drops_cache_busters() {
    let n = UrlNormalizer;
    // `ord` and `cb` by name, the 13-digit value by shape.
    let canonical = n.canonical(
        "https://ads.example/pixel.png?ord=9&cb=5&corr=1699999999999&x=9",
        Origin::Ad,
    );
    assert_eq!(canonical, "ads.example/pixel.png?x=9");
}

#[test]
fn test_canonical_third_party_keeps_cache_busters() {
    let n = UrlNormalizer;
    let canonical = n.canonical(
        "https://cdn.example/img.png?ord=9&corr=1699999999999",
        Origin::ThirdParty,
    );
    assert_eq!(canonical, "cdn.example/img.png?corr=1699999999999&ord=9");
}

#[test]
fn test_canonical_path_only_domains_ignore_query() {
    let n = UrlNormalizer;
    let canonical = n.canonical(
        "https://fonts.gstatic.com/s/roboto.woff2?v=30&x=1",
        Origin::ThirdParty,
    );
    assert_eq!(canonical, "fonts.gstatic.com/s/roboto.woff2");
}

#[test]
fn test_canonical_unparseable_url_passes_through() {
    let n = UrlNormalizer;
    assert_eq!(
        n.canonical("not a url at all", Origin::ThirdParty),
        "not a url at all"
    );
}

#[test]
fn test_alias_ad_host_strips_query() {
    let n = UrlNormalizer;
    let alias = n.alias("https://securepubads.g.doubleclick.net/tag/js/gpt.js?network=1");
    assert_eq!(
        alias.as_deref(),
        Some("alias|securepubads.g.doubleclick.net/tag/js/gpt.js")
    );
}

#[test]
fn test_alias_static_asset_version_param() {
    let n = UrlNormalizer;
    assert_eq!(
        n.alias("https://cdn.example/lib.js?v=9").as_deref(),
        Some("alias|cdn.example/lib.js")
    );
    // Surviving parameters stay, sorted.
    assert_eq!(
        n.alias("https://cdn.example/app.css?v=3&theme=dark").as_deref(),
        Some("alias|cdn.example/app.css?theme=dark")
    );
}

#[test]
fn test_alias_absent_without_version_param() {
    let n = UrlNormalizer;
    assert_eq!(n.alias("https://cdn.example/lib.js?theme=dark"), None);
    assert_eq!(n.alias("https://cdn.example/lib.js"), None);
}

#[test]
fn test_alias_absent_for_non_static_extension() {
    let n = UrlNormalizer;
    assert_eq!(n.alias("https://api.example/data?v=1"), None);
    assert_eq!(n.alias("https://api.example/v2/users?v=1"), None);
}

#[test]
fn test_vary_suffix_only_for_accept() {
    let n = UrlNormalizer;
    let canonical = "cdn.example/pic";
    assert_eq!(n.vary_suffix(canonical, Some("image/webp"), None), canonical);
    assert_eq!(
        n.vary_suffix(canonical, Some("image/webp"), Some("Accept-Encoding")),
        canonical
    );
    let suffixed = n.vary_suffix(canonical, Some("image/webp"), Some("Accept"));
    assert!(suffixed.starts_with("cdn.example/pic|accept="));
    assert_eq!(suffixed.len(), canonical.len() + "|accept=".len() + 8);
}

#[test]
fn test_vary_suffix_is_stable_and_discriminating() {
    let n = UrlNormalizer;
    let canonical = "cdn.example/pic";
    let webp = n.vary_suffix(canonical, Some("image/webp"), Some("accept"));
    let webp_padded = n.vary_suffix(canonical, Some("  image/webp  "), Some("accept"));
    let avif = n.vary_suffix(canonical, Some("image/avif"), Some("accept"));
    assert_eq!(webp, webp_padded);
    assert_ne!(webp, avif);
    // The token must match a full comma-separated entry.
    let multi = n.vary_suffix(canonical, Some("image/webp"), Some("Origin, Accept"));
    assert_eq!(multi, webp);
}

#[test]
fn test_document_normalization_narrow_filter() {
    let n = UrlNormalizer;
    assert_eq!(
        n.document("https://news.example/story?utm_source=tw&fbclid=x&page=2"),
        "news.example/story?page=2"
    );
    assert_eq!(
        n.document("https://news.example/story?gclid=1"),
        "news.example/story"
    );
}

#[test]
fn test_document_key_separate_keyspace() {
    let n = UrlNormalizer;
    let doc = n.document_key("https://news.example/index.html");
    let asset = cache_key(&n.canonical("https://news.example/index.html", Origin::ThirdParty));
    assert_ne!(doc, asset);
    // Tracking params do not change the document identity.
    assert_eq!(
        doc,
        n.document_key("https://news.example/index.html?utm_campaign=a")
    );
}

#[test]
fn test_cache_key_shape() {
    let key = cache_key("");
    // SHA-256 of the empty string.
    assert_eq!(
        key,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    let other = cache_key("cdn.example/a.js");
    assert_eq!(other.len(), 64);
    assert!(other.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(other, cache_key("cdn.example/a.js"));
}
