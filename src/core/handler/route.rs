// src/core/handler/route.rs

//! The capability interface between the core and the browser automation
//! layer. The automation layer surfaces each intercepted request as a
//! [`RouteHandle`]; the handler exits by invoking exactly one terminal
//! operation on it.

use crate::core::errors::EdgeError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Header map as exchanged with the automation layer. Names are expected
/// lowercased; lookups that must be robust go through
/// [`FetchedResponse::header`].
pub type Headers = HashMap<String, String>;

/// A network request surfaced by the automation layer.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    /// Resource type tag: `stylesheet|script|image|font|media|fetch|xhr|document|...`.
    pub resource_type: String,
    pub headers: Headers,
}

/// An origin response. The body is decoded (post-decompression) bytes, which
/// is why encoding headers must never be replayed alongside it.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Origin-advertised compressed size; falls back to the decoded body
    /// length when no `Content-Length` was sent.
    pub fn wire_bytes(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.body.len() as u64)
    }
}

/// One intercepted request in flight.
#[async_trait]
pub trait RouteHandle: Send {
    fn request(&self) -> &InterceptedRequest;

    /// Releases the request to the network untouched. Terminal.
    async fn pass_through(&mut self) -> Result<(), EdgeError>;

    /// Performs the outbound fetch with the given headers, following
    /// redirects and decoding the body.
    async fn fetch(&mut self, headers: Headers) -> Result<FetchedResponse, EdgeError>;

    /// Answers the request from the proxy. Terminal.
    async fn fulfill(&mut self, status: u16, headers: Headers, body: Bytes)
    -> Result<(), EdgeError>;
}
