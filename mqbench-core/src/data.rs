use crate::MAX_PREALLOCATED_SAMPLES;
use std::time::Duration;

/// Result of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The backend reported an error; holds its message.
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// When the request was issued, relative to the start of the benchmark.
    pub issued_at: Duration,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuotaExhausted,
    DeadlineExceeded,
    /// The backend panicked during a request. That request is recorded as a
    /// failure and the backend is still torn down.
    BackendPanicked,
}

/// Everything a single worker measured.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub connection: u64,
    /// Samples in the order they were issued.
    pub samples: Vec<Sample>,
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// When the worker stopped, relative to the start of the benchmark.
    pub stopped_at: Duration,
    pub stop_reason: StopReason,
}

impl WorkerResult {
    pub fn successful_latencies(&self) -> impl Iterator<Item = Duration> + '_ {
        self.samples
            .iter()
            .filter(|s| s.outcome.is_success())
            .map(|s| s.elapsed)
    }
}

/// Append-only sample buffer owned by exactly one worker.
///
/// No synchronization: the buffer never leaves its worker until the worker
/// hands it over with [`LatencyRecorder::finish`].
#[derive(Debug)]
pub struct LatencyRecorder {
    connection: u64,
    samples: Vec<Sample>,
    succeeded: u64,
    failed: u64,
}

impl LatencyRecorder {
    pub fn new(connection: u64, quota: Option<u64>) -> Self {
        let capacity = quota
            .map(|q| usize::try_from(q).unwrap_or(usize::MAX))
            .unwrap_or(0)
            .min(MAX_PREALLOCATED_SAMPLES);

        Self {
            connection,
            samples: Vec::with_capacity(capacity),
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, issued_at: Duration, elapsed: Duration, outcome: Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }

        self.samples.push(Sample {
            issued_at,
            elapsed,
            outcome,
        });
    }

    pub fn issued(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn finish(self, stopped_at: Duration, stop_reason: StopReason) -> WorkerResult {
        WorkerResult {
            connection: self.connection,
            issued: self.issued(),
            succeeded: self.succeeded,
            failed: self.failed,
            samples: self.samples,
            stopped_at,
            stop_reason,
        }
    }
}
