// src/core/storage/entry.rs

//! Cache entry metadata and response-header filtering.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response headers preserved for asset replay.
pub const ASSET_HEADER_WHITELIST: &[&str] = &[
    "content-type",
    "cache-control",
    "etag",
    "last-modified",
    "vary",
    "access-control-allow-origin",
    "access-control-allow-credentials",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-expose-headers",
    "timing-allow-origin",
    "x-content-type-options",
];

/// Response headers preserved for document replay. Documents additionally
/// need their security policy and cookie headers to render correctly.
pub const DOCUMENT_HEADER_WHITELIST: &[&str] = &[
    "content-type",
    "cache-control",
    "etag",
    "last-modified",
    "vary",
    "access-control-allow-origin",
    "access-control-allow-credentials",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-expose-headers",
    "timing-allow-origin",
    "x-content-type-options",
    "content-security-policy",
    "x-frame-options",
    "set-cookie",
    "link",
];

/// A single metadata record in the main index, serialized into `index.json`.
/// The body itself lives in the blob store, addressed by `blob_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The original request URL, kept for reporting.
    pub url: String,
    /// Lowercased hex SHA-256 of the body.
    pub blob_hash: String,
    /// Wall-clock milliseconds at store/refresh time.
    pub stored_at: u64,
    /// Whitelisted response headers, lowercased names.
    pub headers: HashMap<String, String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub vary: Option<String>,
    /// Resource type tag as supplied by the automation layer.
    pub resource_type: String,
    /// Traffic-origin label (`ad` / `third-party`; `document` for documents).
    pub origin: String,
    /// Body byte length.
    pub size: u64,
}

impl CacheEntry {
    /// An entry can be revalidated iff the origin supplied at least one validator.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Lowercases header names. Names differing only in case collapse to one.
pub fn lowercase_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect()
}

/// Retains only whitelisted headers. Expects lowercased names.
pub fn filter_headers(
    headers: &HashMap<String, String>,
    whitelist: &[&str],
) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| whitelist.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
