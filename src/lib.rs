//! # Taxonomy Proxy - Core Library Crate
//!
//! A caching reverse proxy for the WHO ICD-11 classification API. The library
//! holds every component; `main.rs` only wires configuration, logging and
//! signals around [`ProxyServer`].
//!
//! ## How a request flows
//! 1. `routing` validates the inbound request and calls the read-through cache
//! 2. `caching::read_through` answers from the cache store, or on a miss asks
//!    the fetch gateway and stores the payload with its TTL
//! 3. `upstream::FetchGateway` attaches a bearer token from `auth::TokenAccessor`
//!    and performs the HTTP GET
//! 4. a miss also queues a depth-bounded walk of the node's descendants on the
//!    `caching::precache` worker
//!
//! Independently, `scheduler` keeps the token fresh and re-walks the tree from
//! the canonical root on a fixed interval.
//!
//! ## Rust Module System Explained
//!
//! - `mod module_name;` declares a module; `use` imports items from it
//! - items are private by default; `pub` makes them part of the API
//! - `pub use` re-exports items so callers can import them from the crate root

/// Error types and configuration shared by every other module
pub mod core;

/// Credential lifecycle: credential store, OAuth2 token issuer, token accessor
pub mod auth;

/// Authenticated access to the taxonomy API
pub mod upstream;

/// Cache stores, key formats, read-through cache and pre-cache engine
pub mod caching;

/// Background token and full-tree refresh loops
pub mod scheduler;

/// Inbound HTTP surface
pub mod routing;

/// Server wiring and graceful shutdown
pub mod gateway;

/// Structured logging and Prometheus metrics
pub mod observability;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use crate::core::config::ProxyConfig;
pub use crate::core::error::{ProxyError, ProxyResult};
pub use crate::gateway::ProxyServer;
pub use crate::routing::{build_router, AppState};
