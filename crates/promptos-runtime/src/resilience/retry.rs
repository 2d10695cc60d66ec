//! Retry with exponential backoff for transient provider failures.

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::humantime_duration;

/// How often and how patiently to retry a failed model call.
///
/// Only transient errors are retried; see
/// [`ProviderError::is_transient`](crate::providers::ProviderError::is_transient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: usize,

    /// Delay before the first retry
    #[serde(with = "humantime_duration")]
    pub min_delay: Duration,

    /// Upper bound on any single backoff delay
    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,

    /// Longest `Retry-After` wait that is honoured
    #[serde(with = "humantime_duration")]
    pub max_server_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_server_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            min_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff schedule for `backon`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }

    /// The wait before the next attempt.
    ///
    /// `backoff` is the next scheduled delay, `None` once retries are spent.
    /// A server-requested wait stretches the delay, up to `max_server_delay`,
    /// but never adds attempts.
    pub fn next_delay(
        &self,
        backoff: Option<Duration>,
        server_delay: Option<Duration>,
    ) -> Option<Duration> {
        let delay = backoff?;
        Some(match server_delay {
            Some(wait) => delay.max(wait.min(self.max_server_delay)),
            None => delay,
        })
    }
}
