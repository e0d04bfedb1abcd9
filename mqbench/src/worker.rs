use crate::backend::Backend;
use crate::limiter::RequestLimiter;
use futures_util::FutureExt;
use mqbench_core::{LatencyRecorder, Outcome, StopReason, WorkerResult};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Request loop for one connection.
///
/// The worker owns its backend exclusively for the duration of the loop and
/// hands it back together with its measurements, so the orchestrator can tear
/// it down.
pub(crate) struct Worker<B> {
    connection: u64,
    backend: B,
    quota: Option<u64>,
    start: Instant,
    deadline: Option<Instant>,
    limiter: Arc<RequestLimiter>,
}

impl<B: Backend> Worker<B> {
    pub fn new(
        connection: u64,
        backend: B,
        quota: Option<u64>,
        start: Instant,
        deadline: Option<Instant>,
        limiter: Arc<RequestLimiter>,
    ) -> Self {
        Self {
            connection,
            backend,
            quota,
            start,
            deadline,
            limiter,
        }
    }

    pub async fn run(mut self) -> (B, WorkerResult) {
        debug!(connection = self.connection, quota = ?self.quota, "Worker starting");
        let mut recorder = LatencyRecorder::new(self.connection, self.quota);

        let stop_reason = loop {
            if let Some(quota) = self.quota {
                if recorder.issued() >= quota {
                    break StopReason::QuotaExhausted;
                }
            }

            if !acquire_before(&self.limiter, self.deadline).await {
                break StopReason::DeadlineExceeded;
            }

            let issued = Instant::now();
            let res = AssertUnwindSafe(self.backend.perform_request())
                .catch_unwind()
                .await;
            let elapsed = issued.elapsed();

            let (outcome, panicked) = match res {
                Ok(Ok(())) => (Outcome::Success, false),
                Ok(Err(err)) => {
                    trace!("Request on connection {} failed: {err}", self.connection);
                    (Outcome::Failure(err.to_string()), false)
                }
                Err(panic) => {
                    let reason = format!("backend panicked: {}", panic_message(&*panic));
                    error!(connection = self.connection, "{reason}");
                    (Outcome::Failure(reason), true)
                }
            };

            #[cfg(feature = "metrics")]
            {
                let label = if outcome.is_success() { "success" } else { "failure" };
                metrics::counter!("mqbench_requests_total", "outcome" => label).increment(1);
                metrics::histogram!("mqbench_request_latency_seconds").record(elapsed.as_secs_f64());
            }

            recorder.record(issued.duration_since(self.start), elapsed, outcome);

            if panicked {
                break StopReason::BackendPanicked;
            }
        };

        let result = recorder.finish(self.start.elapsed(), stop_reason);
        debug!(
            connection = self.connection,
            issued = result.issued,
            failed = result.failed,
            stop_reason = ?result.stop_reason,
            "Worker stopped"
        );

        (self.backend, result)
    }
}

/// Wait for a permit. Returns false once the deadline has passed, either
/// before or while waiting; a permit granted in time is always used.
async fn acquire_before(limiter: &RequestLimiter, deadline: Option<Instant>) -> bool {
    let Some(deadline) = deadline else {
        limiter.acquire().await;
        return true;
    };

    if Instant::now() >= deadline {
        return false;
    }

    tokio::time::timeout_at(deadline.into(), limiter.acquire())
        .await
        .is_ok()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
