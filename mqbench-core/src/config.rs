#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
#[cfg(feature = "serde")]
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::num::NonZeroU64;
use std::time::Duration;
use thiserror::Error;

/// Benchmark parameters.
///
/// At least one of `total_requests` or `max_duration` should be set. A config
/// with neither is accepted but never terminates on its own; that is left to
/// the caller.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BenchmarkConfig {
    /// Request budget shared by all connections. `None` means unbounded.
    #[cfg_attr(feature = "serde", serde(default))]
    pub total_requests: Option<NonZeroU64>,
    pub connections: usize,
    /// Wall-clock budget. `None` means unbounded.
    #[cfg_attr(feature = "serde", serde_as(as = "Option<DurationSecondsWithFrac<f64>>"))]
    pub max_duration: Option<Duration>,
    /// Aggregate request rate across all connections. `None` means unlimited.
    #[cfg_attr(feature = "serde", serde(default))]
    pub requests_per_second: Option<f64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("at least one connection is required")]
    NoConnections,

    #[error("requests per second must be a finite, non-negative number; got {0}")]
    InvalidRate(f64),
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            total_requests: None,
            connections: 1,
            max_duration: None,
            requests_per_second: None,
        }
    }
}

impl BenchmarkConfig {
    /// Build a config from raw values where `0` means unbounded (or unlimited
    /// for the rate).
    pub fn new(
        total_requests: u64,
        connections: usize,
        max_duration: Duration,
        requests_per_second: f64,
    ) -> Self {
        Self::default()
            .requests(total_requests)
            .connections(connections)
            .duration(max_duration)
            .rate(requests_per_second)
    }

    pub fn requests(mut self, total_requests: u64) -> Self {
        self.total_requests = NonZeroU64::new(total_requests);
        self
    }

    pub fn connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    pub fn duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = (!max_duration.is_zero()).then_some(max_duration);
        self
    }

    pub fn rate(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = (requests_per_second != 0.).then_some(requests_per_second);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::NoConnections);
        }

        if let Some(rate) = self.requests_per_second {
            if !rate.is_finite() || rate < 0. {
                return Err(ConfigError::InvalidRate(rate));
            }
        }

        Ok(())
    }

    /// True when neither a request budget nor a duration bounds the run.
    pub fn is_unbounded(&self) -> bool {
        self.total_requests.is_none() && self.max_duration.is_none()
    }

    /// Per-connection request quotas, in connection order.
    pub fn quotas(&self) -> Vec<Option<u64>> {
        split_quota(self.total_requests, self.connections)
    }

    /// Interval each connection is expected to wait between requests when the
    /// run is paced. Used for coordinated omission correction.
    pub fn expected_interval(&self) -> Option<Duration> {
        let rate = self.requests_per_second?;
        if self.connections == 0 || !rate.is_finite() || rate <= 0. {
            return None;
        }

        Duration::try_from_secs_f64(self.connections as f64 / rate).ok()
    }
}

/// Split `total` across `connections` as evenly as possible. The first
/// `total % connections` connections get one extra request so the quotas sum
/// back to `total`. Without a total every quota is unbounded.
pub fn split_quota(total: Option<NonZeroU64>, connections: usize) -> Vec<Option<u64>> {
    let Some(total) = total else {
        return vec![None; connections];
    };

    if connections == 0 {
        return vec![];
    }

    let total = total.get();
    let base = total / connections as u64;
    let remainder = total % connections as u64;

    (0..connections as u64)
        .map(|idx| Some(base + u64::from(idx < remainder)))
        .collect()
}
