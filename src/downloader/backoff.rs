//! Retry policy shared by every failure class that may be retried

use crate::config::DownloadConfig;
use rand::Rng;
use std::time::Duration;

/// What to do after a retryable attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again
    Retry(Duration),
    /// Attempts are exhausted; fail the link with this message
    GiveUp(String),
}

/// Exponential backoff with a ceiling and random jitter
///
/// The nth retry waits `min(base * 2^(n-1), cap)` plus a uniformly random jitter below
/// `jitter`. A server-supplied delay replaces the computed one when present.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Backoff before the nth retry (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Backoff before the nth retry, with jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.base_delay(retry) + jitter
    }

    /// Decides the next step once `attempts_used` attempts have failed retryably
    ///
    /// # Arguments
    ///
    /// * `attempts_used` - Attempts consumed so far, including the one that just failed
    /// * `reason` - Error text of the failed attempt
    /// * `retry_after` - Delay requested by the server (rate limiting), if any
    pub fn after_failure(
        &self,
        attempts_used: u32,
        reason: &str,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if attempts_used >= self.max_retries {
            return RetryDecision::GiveUp(format!(
                "Max retries ({}) exceeded: {}",
                self.max_retries, reason
            ));
        }

        let delay = retry_after
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.backoff(attempts_used));
        RetryDecision::Retry(delay)
    }
}
