//! Error types for the catalog core.
//!
//! The core distinguishes a small set of fatal conditions
//! ([`CatalogError`]) from durable-store failures ([`StoreError`]), which
//! the orchestrator treats as a cache miss. Lookups that find nothing are
//! not errors: they return `None`.

use thiserror::Error;

/// Fatal errors surfaced by the parser, search engine, and catalog service.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The raw document could not be retrieved.
    #[error("failed to fetch catalog source: {0}")]
    Fetch(String),

    /// The raw document had no content to parse.
    #[error("no content to parse: {0}")]
    Parse(String),

    /// A query was issued before any snapshot was indexed.
    #[error("catalog index not ready; initialize the catalog first")]
    IndexNotReady,
}

/// Failures reading or writing the durable snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
