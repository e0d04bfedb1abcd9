use mock_broker::{Broker, BrokerOptions, Latency, MockBrokerFactory};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let _ = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("mqbench=debug,mock_broker=debug")
            .try_init();
    });
}

/// Factory on a fresh broker whose publishes take `latency`.
#[allow(unused)]
pub fn factory_with_latency(latency: Duration) -> MockBrokerFactory {
    let broker = Broker::with_options(BrokerOptions::default().latency(Latency::Fixed(latency)));
    MockBrokerFactory::new(broker).payload_size(64)
}

#[allow(unused)]
pub fn factory(options: BrokerOptions) -> MockBrokerFactory {
    MockBrokerFactory::new(Broker::with_options(options)).payload_size(64)
}
