//! Orchestrator and its entry points.
use crate::backend::{Backend, BackendFactory};
use crate::error::{BenchError, TeardownError, TeardownFailure};
use crate::limiter::RequestLimiter;
use crate::worker::Worker;
use mqbench_core::{aggregate, wall_clock, BenchmarkConfig, Summary};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Benchmark builder.
///
/// Configure it, then `.await` it to run the benchmark.
///
/// # Example
/// ```no_run
/// # use mqbench::prelude::*;
/// # use std::time::Duration;
/// # async fn example<F: BackendFactory + 'static>(factory: F) -> Result<(), BenchError> {
/// let summary = Benchmark::new(factory)
///     .requests(100_000)
///     .connections(8)
///     .duration(Duration::from_secs(30))
///     .rate(5_000.)
///     .await?;
///
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
#[pin_project::pin_project]
pub struct Benchmark<F> {
    factory: Arc<F>,
    config: BenchmarkConfig,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<Summary, BenchError>> + Send>>>,
}

impl<F> Benchmark<F> {
    /// A benchmark with a single connection and no bounds. Set at least one of
    /// [`Benchmark::requests`] or [`Benchmark::duration`].
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, BenchmarkConfig::default())
    }

    pub fn with_config(factory: F, config: BenchmarkConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
            runner_fut: None,
        }
    }

    /// Total requests across all connections. `0` means unbounded.
    pub fn requests(mut self, total_requests: u64) -> Self {
        self.config = self.config.requests(total_requests);
        self
    }

    pub fn connections(mut self, connections: usize) -> Self {
        self.config = self.config.connections(connections);
        self
    }

    /// Maximum wall-clock duration. Zero means unbounded.
    pub fn duration(mut self, max_duration: Duration) -> Self {
        self.config = self.config.duration(max_duration);
        self
    }

    /// Aggregate requests per second across all connections. `0` means
    /// unlimited.
    pub fn rate(mut self, requests_per_second: f64) -> Self {
        self.config = self.config.rate(requests_per_second);
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }
}

impl<F> Future for Benchmark<F>
where
    F: BackendFactory + 'static,
{
    type Output = Result<Summary, BenchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.runner_fut.is_none() {
            let factory = self.factory.clone();
            let config = self.config.clone();
            self.runner_fut = Some(Box::pin(async move {
                run_benchmark(factory.as_ref(), config).await
            }));
        }

        match &mut self.runner_fut {
            Some(runner) => runner.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

/// Run a benchmark with raw parameters, where `0` means unbounded (or
/// unlimited for `requests_per_second`).
///
/// With neither `total_requests` nor `max_duration` set the benchmark never
/// stops on its own.
pub async fn run<F: BackendFactory>(
    factory: &F,
    total_requests: u64,
    connections: usize,
    max_duration: Duration,
    requests_per_second: f64,
) -> Result<Summary, BenchError> {
    let config = BenchmarkConfig::new(
        total_requests,
        connections,
        max_duration,
        requests_per_second,
    );
    run_benchmark(factory, config).await
}

/// Run a benchmark from a [`BenchmarkConfig`].
pub async fn run_with_config<F: BackendFactory>(
    factory: &F,
    config: BenchmarkConfig,
) -> Result<Summary, BenchError> {
    run_benchmark(factory, config).await
}

#[instrument(name = "benchmark", skip_all, fields(connections = config.connections))]
async fn run_benchmark<F: BackendFactory>(
    factory: &F,
    config: BenchmarkConfig,
) -> Result<Summary, BenchError> {
    config.validate()?;
    info!("Running benchmark with config {:?}", &config);

    if config.is_unbounded() {
        warn!("Neither a request count nor a duration is set; the benchmark will not stop on its own.");
    }

    let backends = setup_backends(factory, config.connections).await?;
    set_active_connections(backends.len());

    let limiter = Arc::new(RequestLimiter::new(config.requests_per_second));
    let quotas = config.quotas();

    // NOTE: The clock starts once every connection is set up, so setup time
    // never counts towards the wall clock or the deadline.
    let start = Instant::now();
    let deadline = config.max_duration.and_then(|d| start.checked_add(d));

    let mut workers = Workers(
        backends
            .into_iter()
            .zip(quotas)
            .map(|((connection, backend), quota)| {
                let worker =
                    Worker::new(connection, backend, quota, start, deadline, limiter.clone());
                (connection, tokio::spawn(worker.run().in_current_span()))
            })
            .collect(),
    );

    let mut finished = Vec::with_capacity(workers.0.len());
    let mut results = Vec::with_capacity(workers.0.len());
    let mut failures = vec![];
    for (connection, handle) in workers.0.iter_mut() {
        let connection = *connection;
        match handle.await {
            Ok((backend, result)) => {
                finished.push((connection, backend));
                results.push(result);
            }
            Err(err) => {
                error!("Worker for connection {connection} did not finish: {err}");
                failures.push(TeardownFailure {
                    connection,
                    source: Box::new(err),
                });
            }
        }
    }

    let elapsed = wall_clock(&results);
    info!("All workers stopped after {}", humantime::format_duration(elapsed));

    failures.extend(teardown_backends(finished).await);
    set_active_connections(0);

    let summary = aggregate(&results, elapsed, &config);
    info!("Benchmark complete: {summary}");

    if failures.is_empty() {
        Ok(summary)
    } else {
        warn!("{} connection(s) failed to shut down cleanly", failures.len());
        Err(TeardownError::new(summary, failures).into())
    }
}

/// Spawned workers. Dropping the benchmark future aborts the ones still
/// running; their backends are dropped without teardown.
struct Workers<T>(Vec<(u64, JoinHandle<T>)>);

impl<T> Drop for Workers<T> {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Create and set up one backend per connection, in connection order.
///
/// Stops at the first failure and tears down the backends that were already
/// set up; their teardown errors are only logged.
async fn setup_backends<F: BackendFactory>(
    factory: &F,
    connections: usize,
) -> Result<Vec<(u64, F::Backend)>, BenchError> {
    let mut ready: Vec<(u64, F::Backend)> = Vec::with_capacity(connections);

    for connection in 0..connections as u64 {
        let mut backend = factory.backend(connection);
        if let Err(err) = backend.setup().await {
            error!("Setup failed on connection {connection}: {err}");

            for (connection, mut backend) in ready.into_iter().rev() {
                if let Err(err) = backend.teardown().await {
                    warn!("Teardown after failed setup also failed on connection {connection}: {err}");
                }
            }

            return Err(BenchError::Setup {
                connection,
                source: Box::new(err),
            });
        }

        trace!("Connection {connection} ready");
        ready.push((connection, backend));
    }

    Ok(ready)
}

async fn teardown_backends<B: Backend>(backends: Vec<(u64, B)>) -> Vec<TeardownFailure> {
    let mut failures = vec![];

    for (connection, mut backend) in backends {
        if let Err(err) = backend.teardown().await {
            warn!("Teardown failed on connection {connection}: {err}");
            failures.push(TeardownFailure {
                connection,
                source: Box::new(err),
            });
        }
    }

    failures
}

#[allow(unused_variables)]
fn set_active_connections(count: usize) {
    #[cfg(feature = "metrics")]
    metrics::gauge!("mqbench_active_connections").set(count as f64);
}
