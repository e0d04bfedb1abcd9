mod utils;
#[allow(unused)]
use utils::*;

use mock_broker::{BrokerOptions, Latency};
use mqbench::prelude::*;
use mqbench::split_quota;
use std::num::NonZeroU64;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fixed_request_count() {
    init();
    let factory = factory_with_latency(Duration::from_micros(500));

    let summary = mqbench::run(&factory, 400, 4, Duration::ZERO, 0.)
        .await
        .unwrap();

    assert_eq!(summary.total_issued, 400);
    assert_eq!(summary.total_succeeded, 400);
    assert_eq!(summary.total_failed, 0);
    assert_eq!(factory.broker().published(), 400);
    assert!(factory.broker().topics().is_empty());

    let latency = summary.latency.unwrap();
    assert!(latency.min >= Duration::from_micros(500));
    assert!(latency.min <= latency.p50);
    assert!(latency.p50 <= latency.p90);
    assert!(latency.p90 <= latency.p99);
    assert!(latency.p99 <= latency.max);
    assert_eq!(summary.percentile(1.), Some(latency.max));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn duration_bound() {
    init();
    let factory = factory_with_latency(Duration::from_millis(2));

    let summary = Benchmark::new(factory.clone())
        .connections(3)
        .duration(Duration::from_millis(500))
        .await
        .unwrap();

    assert!(summary.total_issued > 0);
    assert!(summary.wall_clock >= Duration::from_millis(500));
    assert!(summary.wall_clock < Duration::from_millis(800));
    assert!(factory.broker().topics().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn count_reached_before_deadline() {
    init();
    let factory = factory(BrokerOptions::default());

    let summary = mqbench::run(&factory, 100, 2, Duration::from_secs(30), 0.)
        .await
        .unwrap();

    assert_eq!(summary.total_issued, 100);
    assert!(summary.wall_clock < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn aggregate_rate_limit() {
    init();
    let factory = factory(BrokerOptions::default());

    let summary = mqbench::run(&factory, 0, 5, Duration::from_secs(2), 50.)
        .await
        .unwrap();

    let issued = summary.total_issued as f64;
    assert!(issued >= 90. && issued <= 110., "issued {issued}");
    assert_eq!(summary.expected_interval, Some(Duration::from_millis(100)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn overloaded_broker_failures_are_counted() {
    init();
    let factory = factory(BrokerOptions::default().max_tps(100));

    let summary = mqbench::run(&factory, 1_000, 4, Duration::ZERO, 0.)
        .await
        .unwrap();

    assert_eq!(summary.total_issued, 1_000);
    assert!(summary.total_failed > 0);
    assert_eq!(
        summary.total_succeeded + summary.total_failed,
        summary.total_issued
    );
    assert_eq!(
        summary.failure_reasons.get("broker overloaded"),
        Some(&summary.total_failed)
    );
    assert_eq!(summary.latencies.len() as u64, summary.total_succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn setup_failure_aborts_run() {
    init();
    let factory = factory(BrokerOptions::default()).topic("taken");
    factory.broker().create_topic("taken-2").unwrap();

    let err = mqbench::run(&factory, 100, 4, Duration::ZERO, 0.)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(err.summary().is_none());
    assert!(matches!(err, BenchError::Setup { connection: 2, .. }));
    assert!(err.to_string().contains("could not start benchmark"));

    // Connections 0 and 1 were torn down; the pre-existing topic is untouched.
    assert_eq!(factory.broker().topics(), vec!["taken-2".to_string()]);
    assert_eq!(factory.broker().published(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn teardown_failure_returns_summary() {
    init();
    let factory = factory(BrokerOptions::default().latency(Latency::Fixed(Duration::from_secs(2))))
        .consume(false)
        .async_publish(true)
        .receive_timeout(Duration::from_millis(20));

    let err = mqbench::run(&factory, 10, 2, Duration::ZERO, 0.)
        .await
        .unwrap_err();

    assert!(!err.is_fatal());
    let BenchError::Teardown(teardown) = err else {
        panic!("expected a teardown error");
    };
    assert_eq!(teardown.failures().len(), 2);
    assert_eq!(teardown.summary().total_issued, 10);
    assert_eq!(teardown.summary().total_succeeded, 10);

    let summary = teardown.into_summary();
    assert!(summary.latency.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10_000)]
async fn lost_messages_time_out() {
    init();
    let factory = factory(BrokerOptions::default().max_tps(1))
        .async_publish(true)
        .receive_timeout(Duration::from_millis(50));

    let summary = mqbench::run(&factory, 4, 1, Duration::ZERO, 0.)
        .await
        .unwrap();

    assert_eq!(summary.total_issued, 4);
    assert_eq!(summary.total_succeeded, 1);
    assert_eq!(summary.total_failed, 3);
    assert_eq!(
        summary.failure_reasons.keys().collect::<Vec<_>>(),
        vec!["timed out after 50ms waiting for message"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_connections_than_requests() {
    init();
    let factory = factory(BrokerOptions::default());

    let summary = mqbench::run(&factory, 2, 6, Duration::ZERO, 0.)
        .await
        .unwrap();

    assert_eq!(summary.total_issued, 2);
    assert_eq!(summary.connections, 6);
    assert!(factory.broker().topics().is_empty());
}

#[tokio::test]
async fn zero_connections_rejected() {
    let factory = factory(BrokerOptions::default());

    let err = mqbench::run(&factory, 10, 0, Duration::ZERO, 0.)
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::Config(_)));
    assert_eq!(factory.broker().published(), 0);
}

#[test]
fn quota_split() {
    let quotas = split_quota(NonZeroU64::new(10), 4);
    assert_eq!(quotas, vec![Some(3), Some(3), Some(2), Some(2)]);
    assert_eq!(quotas.iter().flatten().sum::<u64>(), 10);
}
