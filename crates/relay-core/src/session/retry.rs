//! Retry and reconnect timing.
//!
//! Two independent mechanisms coexist:
//!
//! - A **bounded exponential backoff** for *initialization* failures.  After
//!   [`RetryPolicy::MAX_INIT_RETRIES`] consecutive failures the counter is
//!   reset and the next attempt waits [`RetryPolicy::INIT_COOLDOWN`].
//! - An **unbounded fixed delay** ([`RetryPolicy::RECONNECT_DELAY`]) after the
//!   session drops or authentication fails.
//!
//! These values are design constants, not configuration.

use std::time::Duration;

/// Namespace for the retry timing constants.
pub struct RetryPolicy;

impl RetryPolicy {
    /// Initialization retries before falling back to the cooldown.
    pub const MAX_INIT_RETRIES: u32 = 3;

    /// Base of the initialization backoff.
    pub const INIT_RETRY_BASE: Duration = Duration::from_secs(10);

    /// Upper bound of a single initialization backoff step.
    pub const INIT_RETRY_CAP: Duration = Duration::from_secs(60);

    /// Wait after the retry budget is exhausted.
    pub const INIT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

    /// Delay before re-initializing after auth failure or disconnect.
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

    /// Backoff for the given retry number: `min(60s, 10s * 2^retry)`.
    ///
    /// `retry` is the counter value *after* it was incremented for the
    /// failure being handled, so the first retry waits 20 s.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use relay_core::RetryPolicy;
    ///
    /// assert_eq!(RetryPolicy::init_retry_delay(1), Duration::from_secs(20));
    /// assert_eq!(RetryPolicy::init_retry_delay(3), Duration::from_secs(60));
    /// ```
    pub fn init_retry_delay(retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        Self::INIT_RETRY_BASE
            .saturating_mul(factor)
            .min(Self::INIT_RETRY_CAP)
    }
}
