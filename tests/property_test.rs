// tests/property_test.rs

//! Property-based tests for the URL normalizer and header hygiene:
//! invariants that must hold regardless of input values.

use edgeproxy::core::classifier::Origin;
use edgeproxy::core::handler::headers::{replay_headers, strip_encoding};
use edgeproxy::core::normalizer::{UrlNormalizer, cache_key};
use proptest::prelude::*;
use std::collections::HashMap;

fn query_pairs() -> impl Strategy<Value = (Vec<(String, String)>, Vec<(String, String)>)> {
    prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..8).prop_flat_map(|pairs| {
        let original = pairs.clone();
        (Just(original), Just(pairs).prop_shuffle())
    })
}

fn url_with_query(pairs: &[(String, String)]) -> String {
    let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("https://cdn.example/asset.js?{}", query.join("&"))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    /// Permuting the query string never changes the canonical form.
    #[test]
    fn test_canonical_permutation_insensitive((original, shuffled) in query_pairs()) {
        let n = UrlNormalizer;
        for origin in [Origin::Ad, Origin::ThirdParty] {
            let a = n.canonical(&url_with_query(&original), origin);
            let b = n.canonical(&url_with_query(&shuffled), origin);
            prop_assert_eq!(a, b);
        }
    }

    /// Canonicalization is deterministic.
    #[test]
    fn test_canonical_deterministic(pairs in prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..8)) {
        let n = UrlNormalizer;
        let url = url_with_query(&pairs);
        prop_assert_eq!(
            n.canonical(&url, Origin::ThirdParty),
            n.canonical(&url, Origin::ThirdParty)
        );
    }

    /// Cache keys are always 64 lowercase hex characters.
    #[test]
    fn test_cache_key_shape(canonical in ".{0,200}") {
        let key = cache_key(&canonical);
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        prop_assert_eq!(key, cache_key(&canonical));
    }

    /// Replayed headers never leak wire-encoding headers, whatever was stored.
    #[test]
    fn test_replay_never_leaks_encoding_headers(
        mut stored in prop::collection::hash_map("[a-z-]{1,20}", "[ -~]{0,30}", 0..8),
        encoding_value in "[ -~]{1,10}",
    ) {
        stored.insert("content-encoding".to_string(), encoding_value.clone());
        stored.insert("content-length".to_string(), "123".to_string());
        stored.insert("transfer-encoding".to_string(), encoding_value);

        let replayed = replay_headers(&stored);
        prop_assert!(!replayed.contains_key("content-encoding"));
        prop_assert!(!replayed.contains_key("content-length"));
        prop_assert!(!replayed.contains_key("transfer-encoding"));
        prop_assert_eq!(replayed.get("x-edgeproxy").map(String::as_str), Some("HIT"));
        prop_assert!(replayed.contains_key("x-edgeproxy-engine"));

        let stripped: HashMap<String, String> = strip_encoding(&stored);
        prop_assert!(!stripped.contains_key("content-encoding"));
        prop_assert!(!stripped.contains_key("content-length"));
        prop_assert!(!stripped.contains_key("transfer-encoding"));
    }
}
