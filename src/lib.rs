// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]

//! # bibliofabric
//!
//! A resilient async engine for JSON/HTTP API clients. It owns the
//! plumbing every API client needs so that API-specific clients only supply
//! endpoint paths and entity types.
//!
//! ## Features
//!
//! - **Authentication**: no auth, static bearer token, OAuth2 client credentials
//! - **Retries**: exponential backoff over a configurable retryable status set
//! - **Rate Limits**: honors `X-RateLimit-*` and `Retry-After` headers
//! - **Caching**: TTL and LRU bounded cache of parsed GET responses
//! - **Pagination**: get by id, page-number search, cursor iteration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bibliofabric::auth::StaticTokenAuth;
//! use bibliofabric::pagination::{CursorIterable, ListQuery, ResourceClient, ResourceDefinition};
//! use bibliofabric::{ApiClient, ClientSettings, Result};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let api = Arc::new(
//!         ApiClient::builder("https://api.openaire.eu/graph/v1")
//!             .settings(ClientSettings::builder().max_retries(5).build()?)
//!             .auth(Arc::new(StaticTokenAuth::new("my-token")?))
//!             .build()?,
//!     );
//!
//!     let products: ResourceClient =
//!         ResourceClient::new(api.clone(), ResourceDefinition::new("researchProducts", "Research product"));
//!
//!     let mut stream = products.iterate(ListQuery::new().filter("search", "graphene"));
//!     while let Some(item) = stream.next().await {
//!         println!("{:?}", item?);
//!     }
//!
//!     api.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Resource clients (Gettable/Searchable/Iterable)       │
//! │  get(id) → Item        search(query) → Item   iterate → Stream   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │  ResponseUnwrapper
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ApiClient                                │
//! │  cache → rate limit wait → auth → hooks → send → classify/retry  │
//! └─────────────────────────────────────────────────────────────────┘
//!        │              │               │               │
//! ┌──────────┬──────────────┬───────────────┬──────────────────────┐
//! │   Auth   │    Retry     │  Rate Limit   │        Cache         │
//! ├──────────┼──────────────┼───────────────┼──────────────────────┤
//! │ None     │ Backoff      │ X-RateLimit-* │ TTL                  │
//! │ Static   │ Status set   │ Retry-After   │ LRU bound            │
//! │ OAuth2   │ Retry-After  │ Pacing        │ Request fingerprint  │
//! └──────────┴──────────────┴───────────────┴──────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Client settings
pub mod config;

/// Authentication strategies
pub mod auth;

/// Request engine with retry, rate limiting and caching
pub mod http;

/// Response unwrapping and resource pagination
pub mod pagination;

/// Logging setup
pub mod logging;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use auth::{AuthConfig, AuthStrategy};
pub use config::ClientSettings;
pub use http::{ApiClient, ApiResponse, RequestOptions};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
