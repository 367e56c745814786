//! API client with retry, rate limiting and caching
//!
//! One logical [`ApiClient::request`] call goes through:
//! - cache lookup (GET only, when caching is enabled)
//! - a pre-emptive wait if the last observed quota is nearly exhausted
//! - per attempt: authentication, pre-request hooks, send, quota header
//!   observation and status classification
//! - backoff and retry for transient failures
//! - body parsing, post-request hooks and cache store on success

use super::cache::{cache_key, ResponseCache};
use super::hooks::{run_post_request_hooks, run_pre_request_hooks};
use super::rate_limit::{parse_retry_after, RateLimitState, RateLimiter};
use super::request::{ApiResponse, RawResponse, RequestOptions, RequestSpec};
use super::retry::{RetryDecision, RetryPolicy};
use crate::auth::{AuthStrategy, NoAuth};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::pagination::{PathUnwrapper, ResponseUnwrapper};
use crate::types::JsonValue;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    base_url: String,
    settings: ClientSettings,
    auth: Option<Arc<dyn AuthStrategy>>,
    unwrapper: Option<Arc<dyn ResponseUnwrapper>>,
    http_client: Option<Client>,
}

impl ApiClientBuilder {
    /// Set client settings
    #[must_use]
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the authentication strategy (defaults to [`NoAuth`])
    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the response unwrapper (defaults to [`PathUnwrapper::default`])
    #[must_use]
    pub fn unwrapper(mut self, unwrapper: Arc<dyn ResponseUnwrapper>) -> Self {
        self.unwrapper = Some(unwrapper);
        self
    }

    /// Use an existing HTTP client. It is shared with the caller and not released on close.
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> Result<ApiClient> {
        self.settings.validate()?;

        let trimmed = self.base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| Error::config(format!("Invalid base URL '{}': {e}", self.base_url)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Base URL must use http or https, got '{}'",
                self.base_url
            )));
        }

        let owns_transport = self.http_client.is_none();
        let transport = match self.http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.settings.request_timeout)
                .user_agent(self.settings.user_agent.as_str())
                .build()
                .map_err(|e| Error::config(format!("Failed to create HTTP client: {e}")))?,
        };

        let auth = self.auth.unwrap_or_else(|| Arc::new(NoAuth));
        info!("Using authentication strategy: {}", auth.name());

        let cache = ResponseCache::from_settings(&self.settings);
        if let Some(cache) = &cache {
            info!(
                "Client-side caching enabled. Max size: {}, TTL: {:?}",
                cache.max_size(),
                cache.ttl()
            );
        }

        Ok(ApiClient {
            base_url: trimmed.to_string(),
            retry: RetryPolicy::from_settings(&self.settings),
            rate_limiter: RateLimiter::new(&self.settings),
            cache,
            auth,
            unwrapper: self
                .unwrapper
                .unwrap_or_else(|| Arc::new(PathUnwrapper::default())),
            transport: RwLock::new(Some(transport)),
            owns_transport,
            closed: AtomicBool::new(false),
            settings: self.settings,
        })
    }
}

/// Resilient JSON/HTTP API client
pub struct ApiClient {
    base_url: String,
    settings: ClientSettings,
    auth: Arc<dyn AuthStrategy>,
    unwrapper: Arc<dyn ResponseUnwrapper>,
    retry: RetryPolicy,
    rate_limiter: RateLimiter,
    cache: Option<ResponseCache>,
    transport: RwLock<Option<Client>>,
    owns_transport: bool,
    closed: AtomicBool,
}

impl ApiClient {
    /// Start building a client for the given base URL
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            settings: ClientSettings::default(),
            auth: None,
            unwrapper: None,
            http_client: None,
        }
    }

    /// Create a client with default settings and no authentication
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client settings
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Response unwrapper used by the pagination traits
    pub fn unwrapper(&self) -> &Arc<dyn ResponseUnwrapper> {
        &self.unwrapper
    }

    /// Response cache, if caching is enabled
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Last observed rate limit window
    pub async fn rate_limit_state(&self) -> RateLimitState {
        self.rate_limiter.snapshot().await
    }

    /// Check if [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the transport (if owned) and the auth strategy. Safe to call repeatedly.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Client already closed");
            return;
        }

        if self.owns_transport {
            self.transport.write().await.take();
            debug!("Closed owned HTTP transport");
        }
        self.auth.close().await;
        info!("API client closed");
    }

    /// Send a request and parse a successful body into `T`.
    ///
    /// A body that does not parse into `T` is returned as
    /// [`ApiResponse::Raw`] instead of failing. Parsed GET responses are
    /// cached when caching is enabled.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let url = self.resolve_url(path, options.base_url_override.as_deref())?;

        let key = match (&self.cache, method == Method::GET) {
            (Some(cache), true) => {
                let key = cache_key(&method, url.as_str(), &options.params)?;
                if let Some(hit) = cache.get::<T>(&key).await {
                    debug!("Returning cached response for {method} {url}");
                    return Ok(ApiResponse::Parsed(hit));
                }
                Some(key)
            }
            _ => None,
        };

        let (raw, attempts) = self.execute(&method, &url, &options).await?;

        let parsed = match serde_json::from_slice::<T>(&raw.body) {
            Ok(value) => Some(Arc::new(value)),
            Err(e) => {
                warn!(
                    "Response parsing into {} failed for {}: {e}. Returning raw response",
                    std::any::type_name::<T>(),
                    raw.url
                );
                None
            }
        };

        run_post_request_hooks(
            &self.settings.hooks.post_request,
            &raw,
            parsed
                .as_ref()
                .map(|value| &**value as &(dyn Any + Send + Sync)),
            attempts,
        );

        match parsed {
            Some(value) => {
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.put(key, Arc::clone(&value)).await;
                }
                Ok(ApiResponse::Parsed(value))
            }
            None => Ok(ApiResponse::Raw(raw)),
        }
    }

    /// Send a request and return the raw response. Never cached.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<RawResponse> {
        let url = self.resolve_url(path, options.base_url_override.as_deref())?;
        let (raw, attempts) = self.execute(&method, &url, &options).await?;
        run_post_request_hooks(&self.settings.hooks.post_request, &raw, None, attempts);
        Ok(raw)
    }

    /// Send a request and decode the body as JSON
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Arc<JsonValue>> {
        match self.request::<JsonValue>(method, path, options).await? {
            ApiResponse::Parsed(value) => Ok(value),
            ApiResponse::Raw(raw) => Err(Error::decode(format!(
                "Response from {} is not valid JSON (status {})",
                raw.url,
                raw.status.as_u16()
            ))),
        }
    }

    /// Join a path onto the base URL. Absolute URLs are used as-is.
    fn resolve_url(&self, path: &str, base_override: Option<&str>) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let base = base_override
            .map(|b| b.trim().trim_end_matches('/'))
            .unwrap_or(&self.base_url);
        let path = path.trim_start_matches('/');
        let full = if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&full).map_err(|e| Error::validation(format!("Invalid request URL '{full}': {e}")))
    }

    async fn transport(&self) -> Result<Client> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        self.transport
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(Error::ClientClosed)
    }

    /// Run the retry loop until a successful response or a terminal error
    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<(RawResponse, u32)> {
        let client = self.transport().await?;

        self.rate_limiter.maybe_wait().await;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(&client, method, url, options).await {
                Ok(raw) => return Ok((raw, attempts)),
                Err(err) => match self.retry.decide(&err, attempts) {
                    RetryDecision::Retry { delay, attempt } => {
                        warn!(
                            "Request {method} {url} failed ({err}), attempt {attempt}/{} in {delay:?}",
                            self.retry.max_attempts
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!("Giving up on {method} {url} after {attempts} attempt(s): {reason}");
                        return Err(err);
                    }
                },
            }
        }
    }

    /// One attempt: build, sign, hook, send, observe, classify
    async fn attempt(
        &self,
        client: &Client,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<RawResponse> {
        let timeout = self.settings.request_timeout;

        let mut spec = RequestSpec::new(method.clone(), url.clone());
        spec.params = options.params.clone();
        spec.body = options.body.clone();
        spec.set_header("Accept", "application/json")?;
        for (name, value) in &options.headers {
            spec.set_header(name, value)?;
        }

        self.auth.authenticate(&mut spec).await?;
        spec.set_header("User-Agent", &self.settings.user_agent)?;

        run_pre_request_hooks(&self.settings.hooks.pre_request, &mut spec);

        let request = spec.build(client, timeout)?;
        debug!("Sending request: {} {}", request.method(), request.url());

        let response = client
            .execute(request)
            .await
            .map_err(|e| Error::from_transport(&e, spec.url.as_str(), timeout))?;
        let raw = RawResponse::read(response, timeout).await?;
        debug!("Received response: {} for {}", raw.status.as_u16(), raw.url);

        self.rate_limiter.observe(&raw.headers).await;

        classify(raw)
    }
}

/// Map an error status onto the engine's error kinds
fn classify(raw: RawResponse) -> Result<RawResponse> {
    let status = raw.status;
    if status.as_u16() < 400 {
        return Ok(raw);
    }

    let url = raw.url.to_string();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(&raw.headers);
        info!("Rate limit hit (429) for {url}, server hint: {retry_after:?}");
        return Err(Error::RateLimited { url, retry_after });
    }

    Err(Error::api(status.as_u16(), url, raw.text()))
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth.name())
            .field("retry", &self.retry)
            .field("rate_limiter", &self.rate_limiter)
            .field("cache", &self.cache)
            .field("owns_transport", &self.owns_transport)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
