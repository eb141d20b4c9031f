// src/core/errors.rs

//! Defines the primary error type for the entire application.

use thiserror::Error;

/// The main error enum, representing all possible failures within the proxy core.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    IndexSerialization(#[from] serde_json::Error),

    #[error("Outbound fetch failed: {0}")]
    Fetch(String),

    #[error("Route fulfill failed: {0}")]
    Fulfill(String),

    #[error("Route continue failed: {0}")]
    PassThrough(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
