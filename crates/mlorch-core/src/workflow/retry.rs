//! Retry policy for remote step calls.
//!
//! Stateless: all logic lives in associated functions that take the policy
//! values as parameters. Only transient failures (timeouts, connection
//! errors, 5xx responses) are retried; the delay starts at the step's base
//! backoff and doubles on every further retry, capped at [`MAX_BACKOFF`].

use std::time::Duration;

use super::invoker::TransportError;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Stateless retry handler for remote call failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether the failure may succeed if the call is repeated.
    pub fn is_transient(error: &TransportError) -> bool {
        match error {
            TransportError::Timeout { .. } | TransportError::Connection(_) => true,
            TransportError::Status { code, .. } => (500..600).contains(code),
            TransportError::MalformedBody(_) | TransportError::Unconfigured(_) => false,
        }
    }

    /// Determine whether another attempt should be made.
    ///
    /// `attempt` is 1-based (the first call is attempt 1); `retry_count`
    /// is the number of retries allowed after the first call.
    pub fn should_retry(error: &TransportError, attempt: u32, retry_count: u32) -> bool {
        attempt <= retry_count && Self::is_transient(error)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
    }
}
