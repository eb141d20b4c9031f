// src/core/handler/headers.rs

//! Replay and passthrough header hygiene.

use super::route::Headers;

/// Headers describing the wire encoding of a body. The automation layer
/// hands the core decoded bodies, so replaying any of these would corrupt
/// what the browser receives.
const ENCODING_HEADERS: &[&str] = &["content-encoding", "content-length", "transfer-encoding"];

/// Tag added to every outbound fetch.
pub const VIA_VALUE: &str = "1.1 CDN_EdgeProxy";
/// Engine identifier emitted on replays.
pub const ENGINE_TAG: &str = concat!("edgeproxy/", env!("CARGO_PKG_VERSION"));

/// Headers for replaying a cached asset.
pub fn replay_headers(stored: &Headers) -> Headers {
    replay(stored, "HIT")
}

/// Headers for replaying a revalidated document.
pub fn replay_doc_headers(stored: &Headers) -> Headers {
    replay(stored, "DOC-HIT")
}

fn replay(stored: &Headers, marker: &str) -> Headers {
    let mut headers = strip_encoding(stored);
    headers.insert("x-edgeproxy".to_string(), marker.to_string());
    headers.insert("x-edgeproxy-engine".to_string(), ENGINE_TAG.to_string());
    headers
}

/// Drops encoding headers from an origin response before fulfilling with its
/// decoded body. Names are lowercased on the way through.
pub fn strip_encoding(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .filter(|(name, _)| !ENCODING_HEADERS.contains(&name.as_str()))
        .collect()
}

/// Request headers for an outbound fetch, tagged with the proxy Via.
pub fn outbound_headers(request_headers: &Headers) -> Headers {
    let mut headers = request_headers.clone();
    headers.insert("via".to_string(), VIA_VALUE.to_string());
    headers
}

/// Outbound headers extended with the stored entry's validators.
pub fn conditional_headers(
    request_headers: &Headers,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Headers {
    let mut headers = outbound_headers(request_headers);
    if let Some(etag) = etag {
        headers.insert("if-none-match".to_string(), etag.to_string());
    }
    if let Some(last_modified) = last_modified {
        headers.insert("if-modified-since".to_string(), last_modified.to_string());
    }
    headers
}
