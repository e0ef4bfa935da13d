//! Retry policy applied to archive requests.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Statuses worth another attempt: rate limiting and transient server errors.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Upper bound on any single wait, including a server supplied `Retry-After`.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Bounded exponential backoff.
///
/// The wait before retry `n` (1-based) is `backoff_base * 2^(n - 1)`, so the
/// default policy sleeps 2, 4, 8 and 16 seconds between its five attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::ZERO,
        }
    }

    /// Only GET is retried; a repeated write could apply twice.
    pub fn allows(&self, method: &Method) -> bool {
        *method == Method::GET
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    /// True if `attempt` (1-based) failed and another one is still allowed.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Wait before retry number `retry`, preferring the server's `Retry-After` seconds.
    pub fn backoff_for_response(&self, retry: u32, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
            .unwrap_or_else(|| self.backoff(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn default_backoff_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();
        let waits: Vec<_> = (1..policy.max_attempts).map(|n| policy.backoff(n)).collect();
        assert_eq!(
            waits,
            [2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn five_attempts_in_total() {
        let policy = RetryPolicy::default();
        assert!(policy.has_attempts_left(4));
        assert!(!policy.has_attempts_left(5));
        assert!(!RetryPolicy::none().has_attempts_left(1));
    }

    #[test]
    fn only_transient_statuses_are_retryable() {
        let policy = RetryPolicy::default();
        for code in RETRYABLE_STATUSES {
            assert!(policy.is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!policy.is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!policy.is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!policy.is_retryable_status(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn only_get_is_retried() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(&Method::GET));
        assert!(!policy.allows(&Method::POST));
        assert!(!policy.allows(&Method::PUT));
        assert!(!policy.allows(&Method::HEAD));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        let mut headers = HeaderMap::new();
        assert_eq!(policy.backoff_for_response(1, &headers), Duration::from_secs(2));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(policy.backoff_for_response(1, &headers), Duration::from_secs(7));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("9999"));
        assert_eq!(policy.backoff_for_response(1, &headers), MAX_BACKOFF);
    }
}
