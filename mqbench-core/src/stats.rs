#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// Keeps `ceil(p * n)` from rounding up when `p * n` lands a hair above an integer.
const RANK_EPSILON: f64 = 1e-9;

/// Latency statistics over successful requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatencyStats {
    pub min: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub stddev: Duration,
}

impl LatencyStats {
    /// Compute stats from an ascending latency sequence. Returns `None` when
    /// the sequence is empty.
    pub fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        let (&min, &max) = (sorted.first()?, sorted.last()?);

        let total: u128 = sorted.iter().map(Duration::as_nanos).sum();
        let mean = duration_from_nanos(total / sorted.len() as u128);

        let stddev = if sorted.len() > 1 {
            let secs: Vec<f64> = sorted.iter().map(Duration::as_secs_f64).collect();
            let std = statistical::standard_deviation(&secs, Some(mean.as_secs_f64()));
            Duration::try_from_secs_f64(std).unwrap_or_default()
        } else {
            Duration::ZERO
        };

        Some(Self {
            min,
            p50: nearest_rank(sorted, 0.5)?,
            p90: nearest_rank(sorted, 0.9)?,
            p99: nearest_rank(sorted, 0.99)?,
            max,
            mean,
            stddev,
        })
    }
}

/// Nearest-rank percentile: the element at index `ceil(quantile * n) - 1` of
/// an ascending sequence. `quantile` is clamped to `[0, 1]`.
pub fn nearest_rank(sorted: &[Duration], quantile: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }

    let n = sorted.len();
    let quantile = if quantile.is_nan() {
        0.
    } else {
        quantile.clamp(0., 1.)
    };
    let rank = (quantile * n as f64 - RANK_EPSILON).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);

    Some(sorted[idx])
}

pub(crate) fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Aggregate result of a benchmark run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Summary {
    pub connections: usize,
    /// Configured aggregate rate, if the run was paced.
    pub requests_per_second: Option<f64>,
    pub total_issued: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub wall_clock: Duration,
    /// Issued requests per second of wall clock.
    pub throughput: f64,
    /// Successful requests per second of wall clock.
    pub success_throughput: f64,
    /// `None` when no request succeeded.
    pub latency: Option<LatencyStats>,
    /// Failure count per distinct backend error message.
    pub failure_reasons: BTreeMap<String, u64>,
    /// Pacing interval per connection, when the run was rate limited.
    pub expected_interval: Option<Duration>,
    /// Successful latencies in ascending order.
    pub latencies: Vec<Duration>,
}

impl Summary {
    /// Nearest-rank latency percentile over successful requests.
    pub fn percentile(&self, quantile: f64) -> Option<Duration> {
        nearest_rank(&self.latencies, quantile)
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_issued == 0 {
            0.
        } else {
            self.total_failed as f64 / self.total_issued as f64
        }
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={:?}, p50={:?}, p90={:?}, p99={:?}, max={:?}, mean={:?}, stddev={:?}",
            self.min, self.p50, self.p90, self.p99, self.max, self.mean, self.stddev,
        )
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connections={}, RequestRate=",
            self.connections,
        )?;
        match self.requests_per_second {
            Some(rate) => write!(f, "{rate:.2}")?,
            None => write!(f, "unlimited")?,
        }
        write!(
            f,
            ", Issued={}, Succeeded={}, Failed={}, Elapsed={}, Throughput={:.2}/s, Latency=",
            self.total_issued,
            self.total_succeeded,
            self.total_failed,
            humantime::format_duration(self.wall_clock),
            self.throughput,
        )?;
        match &self.latency {
            Some(latency) => write!(f, "[{latency}]"),
            None => write!(f, "no data"),
        }
    }
}
