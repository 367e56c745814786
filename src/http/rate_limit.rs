//! Rate limit awareness
//!
//! Tracks the quota window the server advertises in `X-RateLimit-*` headers
//! and waits for the reset before sending when the remaining quota falls
//! under the configured buffer. Optionally paces requests on the client side
//! with a governor token bucket.

use crate::config::ClientSettings;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Governor};
use reqwest::header::HeaderMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Last observed quota window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitState {
    /// Requests allowed per window
    pub limit: Option<u64>,
    /// Requests left in the current window
    pub remaining: Option<u64>,
    /// When the window resets, in epoch seconds
    pub reset_timestamp: Option<f64>,
}

/// Compute the pre-emptive wait for a state snapshot at time `now` (epoch seconds).
///
/// Returns `None` when the request may go out immediately.
pub fn planned_wait(
    state: &RateLimitState,
    buffer_percentage: f64,
    default_wait: Duration,
    now: f64,
) -> Option<Duration> {
    let remaining = state.remaining?;

    let depleted = remaining == 0
        || match state.limit {
            Some(limit) if limit > 0 => (remaining as f64 / limit as f64) <= buffer_percentage,
            _ => false,
        };
    if !depleted {
        return None;
    }

    match state.reset_timestamp {
        Some(reset) => {
            let secs = reset - now;
            if secs > 0.0 {
                Duration::try_from_secs_f64(secs).ok()
            } else {
                None
            }
        }
        None => Some(default_wait),
    }
}

/// Parse `Retry-After` as delta seconds or an HTTP-date. Dates in the past yield zero.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(HEADER_RETRY_AFTER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => {
            let delta = date.with_timezone(&Utc) - Utc::now();
            Some(delta.to_std().unwrap_or(Duration::ZERO))
        }
        Err(e) => {
            warn!("Could not parse Retry-After value '{value}': {e}");
            None
        }
    }
}

fn epoch_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn parse_count(headers: &HeaderMap, name: &str) -> Option<u64> {
    let raw = headers.get(name)?;
    let value = match raw.to_str() {
        Ok(v) => v.trim(),
        Err(_) => {
            warn!("Ignoring non-text {name} header");
            return None;
        }
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        warn!("Ignoring malformed {name} header: '{value}'");
        return None;
    }
    value.parse().ok()
}

fn parse_reset(headers: &HeaderMap) -> Option<f64> {
    let value = headers.get(HEADER_RESET)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<f64>().ok();
    }
    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => Some(date.timestamp_millis() as f64 / 1000.0),
        Err(e) => {
            warn!("Could not parse {HEADER_RESET} value '{value}': {e}");
            None
        }
    }
}

/// Shared rate limiter for one client
pub struct RateLimiter {
    enabled: bool,
    buffer_percentage: f64,
    default_wait: Duration,
    state: Mutex<RateLimitState>,
    pacer: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Create a rate limiter from client settings
    pub fn new(settings: &ClientSettings) -> Self {
        let pacer = if settings.enable_rate_limiting {
            settings
                .max_requests_per_second
                .and_then(NonZeroU32::new)
                .map(|rps| {
                    info!("Client-side pacing enabled at {rps} requests/second");
                    Governor::direct(Quota::per_second(rps))
                })
        } else {
            None
        };

        Self {
            enabled: settings.enable_rate_limiting,
            buffer_percentage: settings.rate_limit_buffer_percentage,
            default_wait: settings.rate_limit_retry_after_default,
            state: Mutex::new(RateLimitState::default()),
            pacer,
        }
    }

    /// Check if rate limiting is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> RateLimitState {
        *self.state.lock().await
    }

    /// Record the quota headers of a response. Missing or malformed values leave
    /// the previous observation in place.
    pub async fn observe(&self, headers: &HeaderMap) {
        if !self.enabled {
            return;
        }

        let limit = parse_count(headers, HEADER_LIMIT);
        let remaining = parse_count(headers, HEADER_REMAINING);
        let reset = parse_reset(headers);
        if limit.is_none() && remaining.is_none() && reset.is_none() {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(limit) = limit {
            state.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            state.remaining = Some(remaining);
        }
        if let Some(reset) = reset {
            state.reset_timestamp = Some(reset);
        }
        debug!(
            "Rate limit state: limit={:?} remaining={:?} reset={:?}",
            state.limit, state.remaining, state.reset_timestamp
        );
    }

    /// Wait before sending if the last observed window is nearly exhausted.
    ///
    /// The state lock is released before sleeping.
    pub async fn maybe_wait(&self) {
        if !self.enabled {
            return;
        }

        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        let wait = {
            let state = self.state.lock().await;
            planned_wait(&state, self.buffer_percentage, self.default_wait, epoch_now())
        };

        if let Some(wait) = wait {
            info!("Rate limit nearly exhausted, waiting {:.2}s for reset", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("buffer_percentage", &self.buffer_percentage)
            .field("default_wait", &self.default_wait)
            .field("pacing", &self.pacer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    const DEFAULT: Duration = Duration::from_secs(60);

    fn state(limit: Option<u64>, remaining: Option<u64>, reset: Option<f64>) -> RateLimitState {
        RateLimitState {
            limit,
            remaining,
            reset_timestamp: reset,
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test_case(state(Some(100), Some(50), Some(1010.0)), None ; "plenty of quota")]
    #[test_case(state(Some(100), Some(5), Some(1002.0)), Some(Duration::from_secs(2)) ; "under buffer waits for reset")]
    #[test_case(state(Some(100), Some(10), Some(1001.0)), Some(Duration::from_secs(1)) ; "at buffer waits")]
    #[test_case(state(None, Some(0), Some(1003.0)), Some(Duration::from_secs(3)) ; "exhausted without limit")]
    #[test_case(state(Some(100), Some(5), None), Some(DEFAULT) ; "unknown reset uses default")]
    #[test_case(state(Some(100), Some(5), Some(990.0)), None ; "reset already passed")]
    #[test_case(state(Some(100), None, Some(1010.0)), None ; "remaining unknown")]
    fn test_planned_wait(state: RateLimitState, expected: Option<Duration>) {
        assert_eq!(planned_wait(&state, 0.1, DEFAULT, 1000.0), expected);
    }

    #[tokio::test]
    async fn test_observe_headers() {
        let limiter = RateLimiter::new(&ClientSettings::default());
        limiter
            .observe(&headers(&[
                (HEADER_LIMIT, "100"),
                (HEADER_REMAINING, "42"),
                (HEADER_RESET, "1700000000"),
            ]))
            .await;

        assert_eq!(
            limiter.snapshot().await,
            state(Some(100), Some(42), Some(1_700_000_000.0))
        );

        // malformed values keep the previous observation
        limiter
            .observe(&headers(&[(HEADER_LIMIT, "-1"), (HEADER_REMAINING, "41")]))
            .await;
        let snapshot = limiter.snapshot().await;
        assert_eq!(snapshot.limit, Some(100));
        assert_eq!(snapshot.remaining, Some(41));
    }

    #[tokio::test]
    async fn test_observe_http_date_reset() {
        let limiter = RateLimiter::new(&ClientSettings::default());
        limiter
            .observe(&headers(&[(HEADER_RESET, "Wed, 21 Oct 2015 07:28:00 GMT")]))
            .await;
        assert_eq!(
            limiter.snapshot().await.reset_timestamp,
            Some(1_445_412_480.0)
        );
    }

    #[tokio::test]
    async fn test_disabled_limiter_ignores_headers() {
        let settings = ClientSettings::builder().no_rate_limit().build().unwrap();
        let limiter = RateLimiter::new(&settings);
        limiter
            .observe(&headers(&[(HEADER_LIMIT, "100"), (HEADER_REMAINING, "0")]))
            .await;
        assert_eq!(limiter.snapshot().await, RateLimitState::default());

        // returns immediately
        tokio::time::timeout(Duration::from_millis(50), limiter.maybe_wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            parse_retry_after(&headers(&[(HEADER_RETRY_AFTER, "7")])),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            parse_retry_after(&headers(&[(HEADER_RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT")])),
            Some(Duration::ZERO)
        );
        assert_eq!(
            parse_retry_after(&headers(&[(HEADER_RETRY_AFTER, "soon")])),
            None
        );
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_pacer_allows_first_request() {
        let settings = ClientSettings::builder()
            .max_requests_per_second(100)
            .build()
            .unwrap();
        let limiter = RateLimiter::new(&settings);
        tokio::time::timeout(Duration::from_millis(100), limiter.maybe_wait())
            .await
            .unwrap();
    }
}
