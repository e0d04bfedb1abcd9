use crate::{BenchmarkConfig, LatencyStats, Outcome, Summary, WorkerResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Reduce per-worker results into a [`Summary`].
///
/// Pure function of its inputs: aggregating the same results twice yields
/// equal summaries. Failed samples count towards the totals but are left out
/// of the latency distribution.
pub fn aggregate(results: &[WorkerResult], wall_clock: Duration, config: &BenchmarkConfig) -> Summary {
    let total_issued: u64 = results.iter().map(|r| r.issued).sum();
    let total_succeeded: u64 = results.iter().map(|r| r.succeeded).sum();
    let total_failed: u64 = results.iter().map(|r| r.failed).sum();

    let mut latencies: Vec<Duration> = results
        .iter()
        .flat_map(|r| r.successful_latencies())
        .collect();
    latencies.sort_unstable();

    let mut failure_reasons = BTreeMap::new();
    for sample in results.iter().flat_map(|r| &r.samples) {
        if let Outcome::Failure(reason) = &sample.outcome {
            *failure_reasons.entry(reason.clone()).or_insert(0) += 1;
        }
    }

    Summary {
        connections: config.connections,
        requests_per_second: config.requests_per_second,
        total_issued,
        total_succeeded,
        total_failed,
        wall_clock,
        throughput: per_second(total_issued, wall_clock),
        success_throughput: per_second(total_succeeded, wall_clock),
        latency: LatencyStats::from_sorted(&latencies),
        failure_reasons,
        expected_interval: config.expected_interval(),
        latencies,
    }
}

/// Wall clock of a run: from the start of the benchmark to the last worker's stop.
pub fn wall_clock(results: &[WorkerResult]) -> Duration {
    results
        .iter()
        .map(|r| r.stopped_at)
        .max()
        .unwrap_or(Duration::ZERO)
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0. {
        count as f64 / secs
    } else {
        0.
    }
}
