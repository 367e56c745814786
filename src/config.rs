//! Client configuration
//!
//! `ClientSettings` is an immutable value built once and handed to the
//! [`ApiClient`](crate::http::ApiClient) at construction time. It can be
//! assembled with the builder or loaded from YAML.

use crate::error::{Error, Result, ResultExt};
use crate::http::{HookResult, PostRequestHook, PreRequestHook, RawResponse, RequestSpec};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Status codes retried by default
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

// ============================================================================
// Client Settings
// ============================================================================

/// Behavior settings for an API client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Total timeout for a single attempt
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Retries after the initial attempt
    pub max_retries: u32,

    /// Base factor for exponential backoff, in seconds
    pub backoff_factor: f64,

    /// Upper bound for a computed backoff delay
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,

    /// User-Agent header for requests
    pub user_agent: String,

    /// Enable header-driven rate limit awareness
    pub enable_rate_limiting: bool,

    /// Fraction of the quota under which requests wait for the reset (0.1 = 10%)
    pub rate_limit_buffer_percentage: f64,

    /// Wait used when the quota is exhausted but no reset time is known
    #[serde(with = "duration_secs")]
    pub rate_limit_retry_after_default: Duration,

    /// Optional client-side pacing, in requests per second
    pub max_requests_per_second: Option<u32>,

    /// Enable the response cache for GET requests
    pub enable_caching: bool,

    /// Time-to-live of cache entries
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Maximum number of cache entries
    pub cache_max_size: u64,

    /// HTTP status codes treated as transient
    pub retryable_status_codes: BTreeSet<u16>,

    /// Request hooks (not serializable)
    #[serde(skip)]
    pub hooks: Hooks,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_factor: 0.5,
            max_backoff: Duration::from_secs(60),
            user_agent: format!("bibliofabric/{}", env!("CARGO_PKG_VERSION")),
            enable_rate_limiting: true,
            rate_limit_buffer_percentage: 0.1,
            rate_limit_retry_after_default: Duration::from_secs(60),
            max_requests_per_second: None,
            enable_caching: false,
            cache_ttl: Duration::from_secs(300),
            cache_max_size: 128,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            hooks: Hooks::default(),
        }
    }
}

impl ClientSettings {
    /// Create a new settings builder
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder::default()
    }

    /// Load settings from a YAML string. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// Check the settings for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be greater than zero"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(Error::config(format!(
                "backoff_factor must be a non-negative number, got {}",
                self.backoff_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.rate_limit_buffer_percentage) {
            return Err(Error::config(format!(
                "rate_limit_buffer_percentage must be between 0 and 1, got {}",
                self.rate_limit_buffer_percentage
            )));
        }
        if self.enable_caching && self.cache_max_size == 0 {
            return Err(Error::config(
                "cache_max_size must be greater than zero when caching is enabled",
            ));
        }
        if self.max_requests_per_second == Some(0) {
            return Err(Error::config("max_requests_per_second must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for client settings
#[derive(Default)]
pub struct ClientSettingsBuilder {
    settings: ClientSettings,
}

impl ClientSettingsBuilder {
    /// Set the per-attempt timeout
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    /// Set max retries
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.max_retries = retries;
        self
    }

    /// Set backoff factor (seconds) and the cap on computed delays
    #[must_use]
    pub fn backoff(mut self, factor: f64, max: Duration) -> Self {
        self.settings.backoff_factor = factor;
        self.settings.max_backoff = max;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.settings.user_agent = agent.into();
        self
    }

    /// Configure header-driven rate limiting
    #[must_use]
    pub fn rate_limiting(mut self, buffer_percentage: f64, default_wait: Duration) -> Self {
        self.settings.enable_rate_limiting = true;
        self.settings.rate_limit_buffer_percentage = buffer_percentage;
        self.settings.rate_limit_retry_after_default = default_wait;
        self
    }

    /// Disable rate limiting
    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.settings.enable_rate_limiting = false;
        self
    }

    /// Pace outgoing requests on the client side
    #[must_use]
    pub fn max_requests_per_second(mut self, rps: u32) -> Self {
        self.settings.max_requests_per_second = Some(rps);
        self
    }

    /// Enable caching with the given TTL and size bound
    #[must_use]
    pub fn caching(mut self, ttl: Duration, max_size: u64) -> Self {
        self.settings.enable_caching = true;
        self.settings.cache_ttl = ttl;
        self.settings.cache_max_size = max_size;
        self
    }

    /// Replace the retryable status set
    #[must_use]
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.settings.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Register a pre-request hook
    #[must_use]
    pub fn pre_request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestSpec) -> HookResult + Send + Sync + 'static,
    {
        self.settings.hooks.pre_request.push(Arc::new(hook));
        self
    }

    /// Register a post-request hook
    #[must_use]
    pub fn post_request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RawResponse, Option<&(dyn Any + Send + Sync)>, u32) -> HookResult
            + Send
            + Sync
            + 'static,
    {
        self.settings.hooks.post_request.push(Arc::new(hook));
        self
    }

    /// Validate and build the settings
    pub fn build(self) -> Result<ClientSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Hooks run around every request
#[derive(Clone, Default)]
pub struct Hooks {
    /// Called before each attempt is sent, after authentication
    pub pre_request: Vec<PreRequestHook>,
    /// Called once after a successful response
    pub post_request: Vec<PostRequestHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_request", &self.pre_request.len())
            .field("post_request", &self.post_request.len())
            .finish()
    }
}

/// Durations as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_settings_default() {
        let settings = ClientSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_retries, 3);
        assert!((settings.backoff_factor - 0.5).abs() < f64::EPSILON);
        assert!(settings.enable_rate_limiting);
        assert!(!settings.enable_caching);
        assert_eq!(settings.cache_ttl, Duration::from_secs(300));
        assert_eq!(settings.cache_max_size, 128);
        assert_eq!(
            settings.retryable_status_codes,
            [429, 500, 502, 503, 504].into_iter().collect()
        );
        assert!(settings.user_agent.starts_with("bibliofabric/"));
    }

    #[test]
    fn test_settings_builder() {
        let settings = ClientSettings::builder()
            .request_timeout(Duration::from_secs(5))
            .max_retries(1)
            .backoff(0.1, Duration::from_secs(2))
            .user_agent("test-agent/1.0")
            .caching(Duration::from_secs(10), 16)
            .retryable_status_codes([503])
            .pre_request_hook(|_| Ok(()))
            .build()
            .unwrap();

        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.max_backoff, Duration::from_secs(2));
        assert_eq!(settings.user_agent, "test-agent/1.0");
        assert!(settings.enable_caching);
        assert_eq!(settings.cache_max_size, 16);
        assert_eq!(settings.retryable_status_codes.len(), 1);
        assert_eq!(settings.hooks.pre_request.len(), 1);
    }

    #[test]
    fn test_settings_validation() {
        let err = ClientSettings::builder()
            .rate_limiting(1.5, Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ClientSettings::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout"));

        let err = ClientSettings::builder()
            .caching(Duration::from_secs(1), 0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cache_max_size"));

        let err = ClientSettings::builder()
            .backoff(-1.0, Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("backoff_factor"));
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = r"
request_timeout: 12.5
max_retries: 5
enable_caching: true
cache_ttl: 60
retryable_status_codes: [502, 503]
";
        let settings = ClientSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.request_timeout, Duration::from_millis(12_500));
        assert_eq!(settings.max_retries, 5);
        assert!(settings.enable_caching);
        assert_eq!(settings.cache_ttl, Duration::from_secs(60));
        assert_eq!(settings.retryable_status_codes.len(), 2);
        // untouched fields keep defaults
        assert_eq!(settings.cache_max_size, 128);
        assert!(settings.enable_rate_limiting);
    }

    #[test]
    fn test_settings_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries: 0\nenable_rate_limiting: false").unwrap();

        let settings = ClientSettings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.max_retries, 0);
        assert!(!settings.enable_rate_limiting);
    }

    #[test]
    fn test_settings_from_yaml_invalid() {
        let err = ClientSettings::from_yaml_str("rate_limit_buffer_percentage: 3").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ClientSettings::from_yaml_str("max_retries: [1, 2]").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }
}
