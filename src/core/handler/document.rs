// src/core/handler/document.rs

//! Always-revalidate pipeline for HTML documents. A document is never served
//! from the store without the origin confirming it first; the only exception
//! is a network failure with a stored body on hand.

use super::fulfill_ok;
use super::headers::{conditional_headers, outbound_headers, replay_doc_headers, strip_encoding};
use super::route::{FetchedResponse, InterceptedRequest, RouteHandle};
use crate::core::classifier::Origin;
use crate::core::context::Context;
use crate::core::errors::EdgeError;
use tracing::warn;

pub(super) async fn handle_document(
    ctx: &Context,
    route: &mut dyn RouteHandle,
    request: &InterceptedRequest,
) -> Result<(), EdgeError> {
    let origin = ctx
        .classifier
        .classify(&request.url, &request.resource_type)
        .origin;
    let doc_key = ctx.normalizer.document_key(&request.url);
    let stored = ctx.store.peek_meta(&doc_key).await;

    let Some(m) = stored.filter(|m| m.has_validators()) else {
        // No stored entry or no validators: fetch unconditionally.
        let resp = route.fetch(outbound_headers(&request.headers)).await?;
        return serve_fresh_document(ctx, route, request, origin, &doc_key, resp).await;
    };

    let headers =
        conditional_headers(&request.headers, m.etag.as_deref(), m.last_modified.as_deref());
    match route.fetch(headers).await {
        Ok(resp) if resp.status == 304 => {
            if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                let bytes = body.len() as u64;
                ctx.store
                    .stats
                    .doc_hit(&request.url, origin.as_str(), bytes, bytes);
                return fulfill_ok(route, 200, replay_doc_headers(&m.headers), body).await;
            }
            // 304 for a blob that vanished: refetch unconditionally.
            let resp = route.fetch(outbound_headers(&request.headers)).await?;
            serve_fresh_document(ctx, route, request, origin, &doc_key, resp).await
        }
        Ok(resp) if resp.ok() => {
            serve_fresh_document(ctx, route, request, origin, &doc_key, resp).await
        }
        Ok(resp) => {
            // Non-2xx passes through to the browser (minus wire headers).
            fulfill_ok(route, resp.status, strip_encoding(&resp.headers), resp.body).await
        }
        Err(e) => {
            if let Some(body) = ctx.store.get_blob(&m.blob_hash).await {
                warn!(url = %request.url, "document revalidation failed, serving stale: {}", e);
                return fulfill_ok(route, 200, replay_doc_headers(&m.headers), body).await;
            }
            // Let the browser surface the network error.
            route.pass_through().await
        }
    }
}

/// Stores a freshly fetched document when the origin supplied a validator,
/// then fulfills with it. Responses without validators are served untouched:
/// there would be no way to revalidate them later.
async fn serve_fresh_document(
    ctx: &Context,
    route: &mut dyn RouteHandle,
    request: &InterceptedRequest,
    origin: Origin,
    doc_key: &str,
    resp: FetchedResponse,
) -> Result<(), EdgeError> {
    let has_validators = resp.header("etag").is_some() || resp.header("last-modified").is_some();
    if resp.ok() && has_validators && !resp.body.is_empty() {
        if let Err(e) = ctx
            .store
            .put_document(doc_key, &request.url, resp.body.clone(), &resp.headers)
            .await
        {
            warn!(url = %request.url, "document store failed: {}", e);
        }
    }
    ctx.store.stats.doc_miss(
        &request.url,
        origin.as_str(),
        resp.body.len() as u64,
        resp.wire_bytes(),
    );
    fulfill_ok(route, resp.status, strip_encoding(&resp.headers), resp.body).await
}
