// src/core/handler/assets.rs

//! Cache pipeline for static assets and fetch/xhr subresources.

use super::fulfill_ok;
use super::headers::{conditional_headers, outbound_headers, replay_headers, strip_encoding};
use super::route::{FetchedResponse, InterceptedRequest, RouteHandle};
use crate::core::classifier::{Origin, TrafficClassifier};
use crate::core::context::Context;
use crate::core::errors::EdgeError;
use crate::core::normalizer;
use crate::core::storage::CacheEntry;
use tracing::{debug, warn};

pub(super) async fn handle_asset(
    ctx: &Context,
    route: &mut dyn RouteHandle,
    request: &InterceptedRequest,
    origin: Origin,
) -> Result<(), EdgeError> {
    let canonical = ctx.normalizer.canonical(&request.url, origin);
    let alias_key = ctx.normalizer.alias(&request.url);

    let (cache_key, mut meta) = effective_lookup(ctx, &canonical, request).await;
    let mut used_alias = false;
    if meta.is_none() {
        if let Some(alias) = &alias_key {
            meta = ctx.store.peek_alias(alias).await;
            used_alias = meta.is_some();
        }
    }

    // Fresh hit: replay straight from the store.
    if let Some(m) = meta.clone() {
        if ctx.store.is_fresh(&m) {
            if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                let bytes = body.len() as u64;
                ctx.store
                    .stats
                    .hit(&request.url, &request.resource_type, &m.origin, bytes, bytes);
                return fulfill_ok(route, 200, replay_headers(&m.headers), body).await;
            }
            debug!(url = %request.url, "blob missing for fresh entry, treating as miss");
            meta = None;
        }
    }

    // Conditional revalidation against the origin.
    if let Some(m) = meta.clone().filter(|m| m.has_validators()) {
        let headers =
            conditional_headers(&request.headers, m.etag.as_deref(), m.last_modified.as_deref());
        match route.fetch(headers).await {
            Ok(resp) if resp.status == 304 => {
                if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                    ctx.store.refresh_ttl(&cache_key).await;
                    if used_alias {
                        // Promote the alias into a canonical entry so the
                        // next direct request is a fresh hit.
                        if let Err(e) = ctx
                            .store
                            .put(
                                &cache_key,
                                &request.url,
                                body.clone(),
                                &m.headers,
                                &request.resource_type,
                                origin,
                                alias_key.as_deref(),
                            )
                            .await
                        {
                            warn!(url = %request.url, "alias promotion failed: {}", e);
                        }
                    }
                    let bytes = body.len() as u64;
                    ctx.store.stats.revalidated(
                        &request.url,
                        &request.resource_type,
                        &m.origin,
                        bytes,
                        bytes,
                    );
                    return fulfill_ok(route, 200, replay_headers(&m.headers), body).await;
                }
                // 304 for a blob that vanished: nothing to replay, refetch cold.
            }
            Ok(resp) => {
                // The stored copy is obsolete; store and serve the new body.
                return store_and_fulfill(
                    ctx,
                    route,
                    request,
                    origin,
                    &cache_key,
                    alias_key.as_deref(),
                    resp,
                )
                .await;
            }
            Err(e) => {
                // Stale-hit: the origin is unreachable but a body is on hand.
                if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                    warn!(url = %request.url, "revalidation fetch failed, serving stale: {}", e);
                    let bytes = body.len() as u64;
                    ctx.store
                        .stats
                        .hit(&request.url, &request.resource_type, &m.origin, bytes, bytes);
                    return fulfill_ok(route, 200, replay_headers(&m.headers), body).await;
                }
            }
        }
    }

    // Cold miss.
    match route.fetch(outbound_headers(&request.headers)).await {
        Ok(resp) => {
            store_and_fulfill(
                ctx,
                route,
                request,
                origin,
                &cache_key,
                alias_key.as_deref(),
                resp,
            )
            .await
        }
        Err(e) => {
            // Last-resort stale-rescue from whatever the lookup found.
            if let Some(m) = &meta {
                if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                    warn!(url = %request.url, "cold fetch failed, rescuing stale copy: {}", e);
                    return fulfill_ok(route, 200, replay_headers(&m.headers), body).await;
                }
            }
            Err(e)
        }
    }
}

/// Primary lookup with deferred Vary handling: when the entry stored at the
/// base canonical key declares `Vary: Accept`, the effective key is
/// recomputed with the request's Accept digest and resolved again.
async fn effective_lookup(
    ctx: &Context,
    canonical: &str,
    request: &InterceptedRequest,
) -> (String, Option<CacheEntry>) {
    let base_key = normalizer::cache_key(canonical);
    let base_meta = ctx.store.peek_meta_allow_stale(&base_key).await;
    let Some(meta) = base_meta else {
        return (base_key, None);
    };
    let Some(vary) = meta.vary.clone() else {
        return (base_key, Some(meta));
    };
    let accept = request.headers.get("accept").map(String::as_str);
    let suffixed = ctx.normalizer.vary_suffix(canonical, accept, Some(&vary));
    if suffixed == canonical {
        return (base_key, Some(meta));
    }
    let key = normalizer::cache_key(&suffixed);
    let variant = ctx.store.peek_meta_allow_stale(&key).await;
    (key, variant)
}

/// Terminal for every path that reached the origin and got a real response:
/// store when it qualifies, then fulfill with the decoded body.
async fn store_and_fulfill(
    ctx: &Context,
    route: &mut dyn RouteHandle,
    request: &InterceptedRequest,
    origin: Origin,
    cache_key: &str,
    alias_key: Option<&str>,
    resp: FetchedResponse,
) -> Result<(), EdgeError> {
    let is_fetch_like = matches!(request.resource_type.as_str(), "fetch" | "xhr");
    let wire = resp.wire_bytes();
    let body = resp.body.clone();

    if is_fetch_like && !TrafficClassifier::should_cache_by_content_type(resp.content_type()) {
        // API traffic that slipped through the screen: serve, never store.
        ctx.store.stats.miss(
            &request.url,
            &request.resource_type,
            origin.as_str(),
            body.len() as u64,
            wire,
        );
        return fulfill_ok(route, resp.status, strip_encoding(&resp.headers), body).await;
    }

    if resp.ok() && !body.is_empty() {
        if let Err(e) = ctx
            .store
            .put(
                cache_key,
                &request.url,
                body.clone(),
                &resp.headers,
                &request.resource_type,
                origin,
                alias_key,
            )
            .await
        {
            warn!(url = %request.url, "cache store failed, serving uncached: {}", e);
        }
        ctx.store.stats.miss(
            &request.url,
            &request.resource_type,
            origin.as_str(),
            body.len() as u64,
            wire,
        );
    } else {
        // Non-2xx or empty body: a zero-byte miss, nothing stored.
        ctx.store
            .stats
            .miss(&request.url, &request.resource_type, origin.as_str(), 0, 0);
    }
    fulfill_ok(route, resp.status, strip_encoding(&resp.headers), body).await
}
