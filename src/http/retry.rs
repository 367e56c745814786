//! Retry policy
//!
//! Decides, per failed attempt, whether the engine should try again and how
//! long it should wait first. Kept free of I/O so it can be tested on its own.

use crate::config::ClientSettings;
use crate::error::Error;
use std::collections::BTreeSet;
use std::time::Duration;

/// Outcome of [`RetryPolicy::decide`]
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt` (1-based)
    Retry { delay: Duration, attempt: u32 },
    /// Surface the error to the caller
    DoNotRetry { reason: &'static str },
}

/// Exponential backoff retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay in seconds
    pub backoff_factor: f64,
    /// Cap on the computed delay
    pub max_backoff: Duration,
    /// Status codes treated as transient
    pub retryable_status_codes: BTreeSet<u16>,
}

impl RetryPolicy {
    /// Derive the policy from client settings
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.saturating_add(1),
            backoff_factor: settings.backoff_factor,
            max_backoff: settings.max_backoff,
            retryable_status_codes: settings.retryable_status_codes.clone(),
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (zero-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(62) as i32);
        let secs = self.backoff_factor * exp;
        let max = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff)
    }

    /// Check whether an error is transient under this policy
    pub fn is_retryable(&self, error: &Error) -> bool {
        match error {
            Error::Network { .. } | Error::Timeout { .. } | Error::RateLimited { .. } => true,
            Error::Api { status, .. } => self.retryable_status_codes.contains(status),
            _ => false,
        }
    }

    /// Decide what to do after `attempts_made` attempts ended with `error`
    pub fn decide(&self, error: &Error, attempts_made: u32) -> RetryDecision {
        if !self.is_retryable(error) {
            return RetryDecision::DoNotRetry {
                reason: "error is not retryable",
            };
        }
        if attempts_made >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: "retry attempts exhausted",
            };
        }

        let mut delay = self.backoff(attempts_made.saturating_sub(1));
        if let Error::RateLimited {
            retry_after: Some(hint),
            ..
        } = error
        {
            delay = delay.max(*hint);
        }

        RetryDecision::Retry {
            delay,
            attempt: attempts_made + 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_factor: 0.5,
            max_backoff: Duration::from_secs(3),
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
        }
    }

    #[test_case(0, 500 ; "first retry waits the factor")]
    #[test_case(1, 1000 ; "second retry doubles")]
    #[test_case(2, 2000 ; "third retry doubles again")]
    #[test_case(3, 3000 ; "capped at max backoff")]
    #[test_case(100, 3000 ; "huge attempt stays capped")]
    fn test_backoff(attempt: u32, expected_ms: u64) {
        assert_eq!(policy().backoff(attempt), Duration::from_millis(expected_ms));
    }

    #[test_case(Error::api(503, "u", ""), true ; "retryable status")]
    #[test_case(Error::api(501, "u", ""), false ; "status outside set")]
    #[test_case(Error::api(404, "u", ""), false ; "not found")]
    #[test_case(Error::Network { url: "u".into(), message: "reset".into() }, true ; "network")]
    #[test_case(Error::Timeout { url: "u".into(), timeout_ms: 10 }, true ; "timeout")]
    #[test_case(Error::RateLimited { url: "u".into(), retry_after: None }, true ; "rate limited")]
    #[test_case(Error::auth("denied"), false ; "auth")]
    #[test_case(Error::validation("bad"), false ; "validation")]
    fn test_is_retryable(error: Error, expected: bool) {
        assert_eq!(policy().is_retryable(&error), expected);
    }

    #[test]
    fn test_decide_retries_until_exhausted() {
        let policy = policy();
        let err = Error::api(500, "u", "");

        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::Retry {
                delay: Duration::from_millis(500),
                attempt: 2
            }
        );
        assert_eq!(
            policy.decide(&err, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 3
            }
        );
        assert!(matches!(
            policy.decide(&err, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let policy = policy();
        let err = Error::RateLimited {
            url: "u".into(),
            retry_after: Some(Duration::from_secs(10)),
        };
        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(10),
                attempt: 2
            }
        );

        let short = Error::RateLimited {
            url: "u".into(),
            retry_after: Some(Duration::from_millis(1)),
        };
        assert_eq!(
            policy.decide(&short, 1),
            RetryDecision::Retry {
                delay: Duration::from_millis(500),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = ClientSettings::builder()
            .max_retries(2)
            .backoff(0.01, Duration::from_secs(1))
            .build()
            .unwrap();
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(0), Duration::from_millis(10));
    }
}
