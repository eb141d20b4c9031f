// src/core/handler/mod.rs

//! The request handler: one state machine deciding among bypass, fresh-serve,
//! conditional revalidation, miss-fetch-store, and stale rescue, with a
//! separate always-revalidate branch for documents.

mod assets;
mod document;
pub mod headers;
pub mod route;

pub use route::{FetchedResponse, InterceptedRequest, RouteHandle};

use crate::core::classifier::TrafficClass;
use crate::core::context::Context;
use crate::core::errors::EdgeError;
use bytes::Bytes;
use route::Headers;
use tracing::{debug, warn};

/// Resource types eligible for the asset cache path.
const CACHEABLE_RESOURCE_TYPES: &[&str] = &[
    "stylesheet",
    "script",
    "image",
    "font",
    "media",
    "fetch",
    "xhr",
];

/// Entry point: classifies and dispatches one intercepted request. Exits by
/// invoking exactly one terminal route operation, or by propagating a fetch
/// error no stale body could absorb.
pub async fn handle_request(ctx: &Context, route: &mut dyn RouteHandle) -> Result<(), EdgeError> {
    let request = route.request().clone();

    if !request.method.eq_ignore_ascii_case("GET") {
        return route.pass_through().await;
    }
    if request.resource_type == "document" {
        return document::handle_document(ctx, route, &request).await;
    }
    if !CACHEABLE_RESOURCE_TYPES.contains(&request.resource_type.as_str()) {
        return route.pass_through().await;
    }

    let verdict = ctx.classifier.classify(&request.url, &request.resource_type);
    match verdict.class {
        TrafficClass::Auction | TrafficClass::Beacon => {
            debug!(class = ?verdict.class, url = %request.url, "bypassing revenue-bearing request");
            route.pass_through().await
        }
        TrafficClass::Cacheable => assets::handle_asset(ctx, route, &request, verdict.origin).await,
    }
}

/// Fulfills, downgrading failures to a warning: when the peer already went
/// away there is nobody left to answer.
pub(crate) async fn fulfill_ok(
    route: &mut dyn RouteHandle,
    status: u16,
    headers: Headers,
    body: Bytes,
) -> Result<(), EdgeError> {
    if let Err(e) = route.fulfill(status, headers, body).await {
        warn!("fulfill failed, peer likely disconnected: {}", e);
    }
    Ok(())
}
