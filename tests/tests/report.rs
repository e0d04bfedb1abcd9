mod utils;
#[allow(unused)]
use utils::*;

use mock_broker::BrokerOptions;
use mqbench::prelude::*;
use mqbench::Buckets;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn report_file_after_run() {
    init();
    let factory = factory_with_latency(Duration::from_micros(200));
    let summary = mqbench::run(&factory, 500, 2, Duration::ZERO, 0.)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mock.txt");
    summary
        .generate_latency_distribution(&ReportOptions::default(), &path)
        .unwrap();

    let report = std::fs::read_to_string(&path).unwrap();
    assert!(report.contains("# connections: 2"));
    assert!(report.contains("# issued: 500, succeeded: 500, failed: 0"));
    assert!(report.contains("# Percentiles"));
    assert!(report.contains("# Histogram"));
    assert!(report.contains("# HdrHistogram percentile distribution (us)"));
    assert!(report.contains("#[Max = "));
    assert!(!report.contains("# Samples (us)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn report_is_deterministic() {
    init();
    let factory = factory(BrokerOptions::default());
    let summary = mqbench::run(&factory, 200, 4, Duration::ZERO, 0.)
        .await
        .unwrap();

    let options = ReportOptions::default()
        .buckets(Buckets::Count(8))
        .include_samples(true);

    let mut first = vec![];
    let mut second = vec![];
    summary.write_latency_distribution(&options, &mut first).unwrap();
    summary.write_latency_distribution(&options, &mut second).unwrap();

    assert_eq!(first, second);
    let report = String::from_utf8(first).unwrap();
    let samples = report
        .split("# Samples (us)\n")
        .nth(1)
        .unwrap()
        .lines()
        .count();
    assert_eq!(samples, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn report_without_successes() {
    init();
    let factory = factory(BrokerOptions::default()).consume(false);
    let broker = factory.broker().clone();
    let summary = mqbench::run(
        &FailingFactory { inner: factory, broker },
        20,
        2,
        Duration::ZERO,
        0.,
    )
    .await
    .unwrap();

    assert_eq!(summary.total_failed, 20);
    assert_eq!(summary.latency, None);

    let mut out = vec![];
    summary
        .write_latency_distribution(&ReportOptions::default(), &mut out)
        .unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("# no successful samples"));
    assert!(!report.contains("# Percentiles"));
}

/// Deletes each connection's topic right after setup so every request fails.
struct FailingFactory {
    inner: mock_broker::MockBrokerFactory,
    broker: mock_broker::Broker,
}

struct FailingBackend {
    inner: mock_broker::MockBackend,
    broker: mock_broker::Broker,
}

impl BackendFactory for FailingFactory {
    type Backend = FailingBackend;

    fn backend(&self, connection: u64) -> FailingBackend {
        FailingBackend {
            inner: self.inner.backend(connection),
            broker: self.broker.clone(),
        }
    }
}

impl Backend for FailingBackend {
    type Error = mock_broker::MockError;

    async fn setup(&mut self) -> Result<(), Self::Error> {
        self.inner.setup().await?;
        self.broker.delete_topic(self.inner.topic())?;
        Ok(())
    }

    async fn perform_request(&mut self) -> Result<(), Self::Error> {
        self.inner.perform_request().await
    }

    async fn teardown(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
