//! HTTP request engine
//!
//! Provides the [`ApiClient`] that every resource sends its requests through.
//!
//! # Features
//!
//! - **Automatic Retries**: exponential backoff over a configurable set of transient failures
//! - **Rate Limiting**: waits for the advertised quota reset, with optional governor pacing
//! - **Caching**: TTL and size bounded cache of parsed GET responses
//! - **Authentication**: pluggable [`AuthStrategy`](crate::auth::AuthStrategy)
//! - **Hooks**: user callbacks before each attempt and after success

mod cache;
mod client;
mod hooks;
mod rate_limit;
mod request;
mod retry;

pub use cache::{cache_key, ResponseCache};
pub use client::{ApiClient, ApiClientBuilder};
pub use hooks::{HookResult, PostRequestHook, PreRequestHook};
pub use rate_limit::{parse_retry_after, planned_wait, RateLimitState, RateLimiter};
pub use request::{ApiResponse, RawResponse, RequestBody, RequestOptions, RequestSpec};
pub use retry::{RetryDecision, RetryPolicy};
