//! # Free-tier Catalog
//!
//! An in-memory, searchable catalog of free-tier developer services parsed
//! from the free-for.dev README.
//!
//! The raw markdown is fetched, parsed into typed records grouped by
//! category, indexed for typo-tolerant ranked search, and cached on disk
//! for 24 hours. The catalog is exposed through a CLI, an MCP stdio server,
//! and a JSON HTTP API, all sharing one tool registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────────┐
//! │ Fetcher  │──▶│  Parser  │──▶│ CatalogSnapshot │
//! │ HTTP/File│   │ markdown │   └───────┬─────────┘
//! └──────────┘   └──────────┘           │
//!                           ┌───────────┼────────────┐
//!                           ▼           ▼            ▼
//!                    ┌────────────┐ ┌────────┐ ┌────────────┐
//!                    │SearchEngine│ │ Cache  │ │ Catalog    │
//!                    │fuzzy + memo│ │Manager │ │ Service    │
//!                    └────────────┘ └────────┘ └─────┬──────┘
//!                                                    │
//!                              ┌──────────────┬──────┴──────┐
//!                              ▼              ▼             ▼
//!                          ┌───────┐    ┌──────────┐   ┌────────┐
//!                          │  CLI  │    │   MCP    │   │  HTTP  │
//!                          │ (ftc) │    │ (stdio)  │   │ (axum) │
//!                          └───────┘    └──────────┘   └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ftc search "postgres databse"     # typo-tolerant ranked search
//! ftc categories --with-count
//! ftc serve mcp                     # MCP server on stdio
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Core error types |
//! | [`models`] | Core data types |
//! | [`parser`] | Markdown to catalog records |
//! | [`fuzzy`] | Approximate term matching |
//! | [`ttl_cache`] | Bounded TTL + LRU cache |
//! | [`search`] | Filtered, ranked search and similarity |
//! | [`store`] | Durable snapshot store and two-level cache |
//! | [`fetch`] | Raw document retrieval |
//! | [`catalog`] | Orchestration of fetch, parse, index, and cache |
//! | [`tools`] | Tool trait, registry, and parameter validation |
//! | [`mcp`] | MCP stdio bridge |
//! | [`server`] | JSON HTTP API |

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fuzzy;
pub mod mcp;
pub mod models;
pub mod parser;
pub mod search;
pub mod server;
pub mod store;
pub mod tools;
pub mod ttl_cache;
