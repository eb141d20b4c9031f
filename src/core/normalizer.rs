// src/core/normalizer.rs

//! Pure URL normalization: canonical cache keys, revalidation aliases, and
//! Accept-variant suffixes.
//!
//! The canonical form makes the cache key independent of tracking parameters
//! and query-string ordering; the alias form additionally survives
//! cache-buster churn so a stored body can still be revalidated when only a
//! version stamp changed.

use crate::core::classifier::Origin;
use sha2::{Digest, Sha256};
use url::Url;
use url::form_urlencoded;

/// Query parameters that never influence response bytes; always dropped.
/// `utm_*` is matched by prefix.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "dclid", "fbclid", "msclkid", "ttclid", "twclid", "igshid", "yclid", "_ga", "_gl",
    "mc_cid", "mc_eid", "ref", "ref_", "cmpid", "s_kwcid", "spm",
];

/// Parameters ad servers use to defeat caches; dropped only for ad-origin URLs.
const AD_CACHE_BUSTER_PARAMS: &[&str] = &[
    "ord",
    "correlator",
    "rnd",
    "rand",
    "random",
    "cb",
    "cachebuster",
    "cache_buster",
    "t",
    "ts",
    "timestamp",
    "nc",
    "_",
    "__",
];

/// Hosts whose query strings never select content: ad-serving CDNs and public
/// font CDNs. Their canonical form is bare `hostname + path`.
const PATH_ONLY_DOMAINS: &[&str] = &[
    "securepubads.g.doubleclick.net",
    "pagead2.googlesyndication.com",
    "tpc.googlesyndication.com",
    "s0.2mdn.net",
    "fonts.gstatic.com",
    "use.typekit.net",
    "use.fontawesome.com",
];

/// Hosts whose assets are aliased by bare `hostname + path` (query stripped).
const AD_ALIAS_HOSTS: &[&str] = &[
    "securepubads.g.doubleclick.net",
    "pagead2.googlesyndication.com",
    "tpc.googlesyndication.com",
    "s0.2mdn.net",
    "cdn.adsafeprotected.com",
    "static.adsafeprotected.com",
    "static.criteo.net",
];

/// File extensions identifying static assets eligible for version-param aliasing.
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    "js", "css", "woff", "woff2", "ttf", "otf", "eot", "svg", "png", "jpg", "jpeg", "gif", "webp",
    "avif", "ico", "wasm", "mp4", "webm", "mp3", "ogg",
];

/// Parameter names that carry build or deploy versions on static assets.
const VERSION_PARAMS: &[&str] = &[
    "v",
    "ver",
    "version",
    "hash",
    "h",
    "rev",
    "build",
    "cb",
    "cachebuster",
    "cache_buster",
    "t",
    "ts",
    "timestamp",
    "_",
    "__",
    "rnd",
    "rand",
    "random",
    "nc",
    "chunk",
    "m",
];

/// The narrow tracking filter applied to document URLs. `utm_*` by prefix.
const DOCUMENT_TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "_ga", "_gl", "mc_cid", "mc_eid", "ref", "ref_", "twclid", "igshid",
    "ttclid", "dclid", "msclkid", "yclid",
];

/// Keyspace prefix separating document entries from asset entries.
const DOCUMENT_KEY_PREFIX: &str = "doc:";
/// Prefix marking alias-index keys so they can never collide with canonicals.
/// The remainder of an alias string is itself a canonical string, which is
/// what lets an alias resolve against entries stored before it was registered.
pub const ALIAS_PREFIX: &str = "alias|";

/// Stateless URL normalizer. All methods are pure; URL parse failures return
/// the input unchanged (canonical/document) or `None` (alias).
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlNormalizer;

impl UrlNormalizer {
    /// Computes the canonical string for an asset URL: lowercased hostname,
    /// path, and a filtered, sorted query string.
    pub fn canonical(&self, url: &str, origin: Origin) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
        let path = parsed.path();

        if PATH_ONLY_DOMAINS.contains(&host.as_str()) {
            return format!("{host}{path}");
        }

        let mut params: Vec<(String, String)> = parsed
            .query_pairs()
            .into_owned()
            .filter(|(key, value)| keep_asset_param(key, value, origin))
            .collect();
        if params.is_empty() {
            return format!("{host}{path}");
        }
        params.sort();
        format!("{host}{path}?{}", encode_query(&params))
    }

    /// Computes the optional alias key used to locate a stored entry across
    /// cache-buster changes.
    pub fn alias(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let path = parsed.path();

        if AD_ALIAS_HOSTS.contains(&host.as_str()) {
            return Some(format!("{ALIAS_PREFIX}{host}{path}"));
        }

        if !has_static_extension(path) {
            return None;
        }
        let mut removed_any = false;
        let mut survivors: Vec<(String, String)> = Vec::new();
        for (key, value) in parsed.query_pairs().into_owned() {
            if VERSION_PARAMS.contains(&key.to_ascii_lowercase().as_str()) {
                removed_any = true;
            } else {
                survivors.push((key, value));
            }
        }
        if !removed_any {
            return None;
        }
        survivors.sort();
        if survivors.is_empty() {
            Some(format!("{ALIAS_PREFIX}{host}{path}"))
        } else {
            Some(format!(
                "{ALIAS_PREFIX}{host}{path}?{}",
                encode_query(&survivors)
            ))
        }
    }

    /// Extends a canonical with the negotiated Accept variant when the stored
    /// response declared `Vary: Accept`.
    pub fn vary_suffix(
        &self,
        canonical: &str,
        request_accept: Option<&str>,
        stored_vary: Option<&str>,
    ) -> String {
        let varies_on_accept = stored_vary
            .map(|vary| {
                vary.to_ascii_lowercase()
                    .split(',')
                    .any(|token| token.trim() == "accept")
            })
            .unwrap_or(false);
        if !varies_on_accept {
            return canonical.to_string();
        }
        let accept = request_accept.unwrap_or("").trim();
        let digest = format!("{:x}", md5::compute(accept.as_bytes()));
        format!("{canonical}|accept={}", &digest[..8])
    }

    /// Normalized document URL: hostname + path with the narrow tracking
    /// filter and sorted surviving parameters.
    pub fn document(&self, url: &str) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
        let path = parsed.path();
        let mut params: Vec<(String, String)> = parsed
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| keep_document_param(key))
            .collect();
        if params.is_empty() {
            return format!("{host}{path}");
        }
        params.sort();
        format!("{host}{path}?{}", encode_query(&params))
    }

    /// The index key for a document URL.
    pub fn document_key(&self, url: &str) -> String {
        cache_key(&format!("{DOCUMENT_KEY_PREFIX}{}", self.document(url)))
    }
}

/// The cache's internal key: lowercased hex SHA-256 of the canonical string.
pub fn cache_key(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn keep_asset_param(key: &str, value: &str, origin: Origin) -> bool {
    let key = key.to_ascii_lowercase();
    if key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str()) {
        return false;
    }
    if origin == Origin::Ad {
        if AD_CACHE_BUSTER_PARAMS.contains(&key.as_str()) {
            return false;
        }
        if is_long_decimal(value) {
            return false;
        }
    }
    true
}

fn keep_document_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    !(key.starts_with("utm_") || DOCUMENT_TRACKING_PARAMS.contains(&key.as_str()))
}

/// Purely decimal integers of at least ten digits: the shape of millisecond
/// timestamps and ad-server correlators.
fn is_long_decimal(value: &str) -> bool {
    value.len() >= 10 && value.bytes().all(|b| b.is_ascii_digit())
}

fn has_static_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or("");
    match file.rsplit_once('.') {
        Some((_, ext)) => STATIC_ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Re-encodes already-sorted pairs; duplicates are preserved.
fn encode_query(params: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
