use anyhow::{Context, Result};
use clap::Parser;
use mock_broker::{Broker, BrokerOptions, Latency, MockBrokerFactory};
use mqbench::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
#[allow(unused)]
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_REQUESTS: u64 = 100_000;
const DEFAULT_CONNECTIONS: usize = 10;

/// Benchmark the in-process mock broker.
#[derive(Parser, Debug)]
#[command(version = "0.1")]
struct Cli {
    /// Total requests across all connections; 0 for unbounded.
    #[arg(short('n'), long)]
    requests: Option<u64>,

    #[arg(short, long)]
    connections: Option<usize>,

    /// Maximum run time, e.g. `30s`; 0s for unbounded.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Aggregate requests per second; 0 for unlimited.
    #[arg(short, long)]
    rate: Option<f64>,

    #[arg(short('s'), long, default_value_t = mock_broker::DEFAULT_PAYLOAD_SIZE)]
    payload_size: usize,

    /// Broker latency per publish, e.g. `500us`.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    latency: Option<Duration>,

    /// Standard deviation of the broker latency.
    #[arg(long, value_parser = humantime::parse_duration, requires = "latency")]
    jitter: Option<Duration>,

    /// Broker rejects publishes beyond this rate.
    #[arg(long)]
    max_tps: Option<u32>,

    /// JSON benchmark config; command line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Latency distribution report.
    #[arg(short, long, default_value = "mock.txt")]
    output: PathBuf,

    /// Dump every latency into the report.
    #[arg(long)]
    samples: bool,

    #[arg(long)]
    async_publish: bool,

    /// Only publish; do not wait for the message to come back.
    #[arg(long)]
    no_consume: bool,
}

impl Cli {
    fn benchmark_config(&self) -> Result<BenchmarkConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => BenchmarkConfig::default()
                .requests(DEFAULT_REQUESTS)
                .connections(DEFAULT_CONNECTIONS),
        };

        if let Some(requests) = self.requests {
            config = config.requests(requests);
        }
        if let Some(connections) = self.connections {
            config = config.connections(connections);
        }
        if let Some(duration) = self.duration {
            config = config.duration(duration);
        }
        if let Some(rate) = self.rate {
            config = config.rate(rate);
        }

        Ok(config)
    }

    fn broker(&self) -> Broker {
        let latency = match (self.latency, self.jitter) {
            (Some(mean), Some(std)) => Latency::Jitter { mean, std },
            (Some(latency), None) => Latency::Fixed(latency),
            (None, _) => Latency::None,
        };

        let mut options = BrokerOptions::default().latency(latency);
        if let Some(max_tps) = self.max_tps {
            options = options.max_tps(max_tps);
        }
        Broker::with_options(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mqbench=info,mock_broker=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.benchmark_config()?;

    let factory = MockBrokerFactory::new(cli.broker())
        .payload_size(cli.payload_size)
        .consume(!cli.no_consume)
        .async_publish(cli.async_publish);

    let summary = match Benchmark::with_config(factory, config).await {
        Ok(summary) => summary,
        Err(BenchError::Teardown(err)) => {
            for failure in err.failures() {
                warn!("{failure}");
            }
            err.into_summary()
        }
        Err(err) => return Err(err.into()),
    };

    println!("{summary}");

    let options = ReportOptions::default().include_samples(cli.samples);
    summary
        .generate_latency_distribution(&options, &cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!("Latency distribution written to {}", cli.output.display());

    Ok(())
}
