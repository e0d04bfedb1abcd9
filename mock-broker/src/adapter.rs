//! Backend adapter that benchmarks a [`Broker`].
//!
//! Each connection gets its own topic. A request publishes one message and,
//! when consuming, waits for the subscription callback to hand it back.
use crate::broker::{Broker, BrokerError, Message, SubscriptionId};
use mqbench::{Backend, BackendFactory};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;

const CHANNEL_CAPACITY: usize = 1024;
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum MockError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("timed out after {0:?} waiting for message")]
    Timeout(Duration),

    #[error("subscription closed")]
    Closed,

    #[error("{0} publish(es) still unacknowledged")]
    PendingAcks(u64),
}

/// Creates one [`MockBackend`] per connection, each on topic
/// `"{topic}-{connection}"`.
#[derive(Clone)]
pub struct MockBrokerFactory {
    broker: Broker,
    topic: String,
    payload_size: usize,
    consume: bool,
    async_publish: bool,
    receive_timeout: Duration,
}

impl MockBrokerFactory {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            topic: "topic".to_string(),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            consume: true,
            async_publish: false,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Wait for each published message to come back through the
    /// subscription. Without it a request is only the publish.
    pub fn consume(mut self, consume: bool) -> Self {
        self.consume = consume;
        self
    }

    /// Publish without waiting for the broker; acknowledgements are tracked
    /// and drained on teardown.
    pub fn async_publish(mut self, async_publish: bool) -> Self {
        self.async_publish = async_publish;
        self
    }

    pub fn receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }
}

impl BackendFactory for MockBrokerFactory {
    type Backend = MockBackend;

    fn backend(&self, connection: u64) -> MockBackend {
        MockBackend {
            broker: self.broker.clone(),
            topic: format!("{}-{connection}", self.topic),
            payload_size: self.payload_size,
            payload: Arc::from(Vec::new()),
            consume: self.consume,
            async_publish: self.async_publish,
            receive_timeout: self.receive_timeout,
            subscription: None,
            acks: Arc::new(Acks::default()),
        }
    }
}

#[derive(Default)]
struct Acks {
    pending: AtomicU64,
    failed: AtomicU64,
}

pub struct MockBackend {
    broker: Broker,
    topic: String,
    payload_size: usize,
    payload: Arc<[u8]>,
    consume: bool,
    async_publish: bool,
    receive_timeout: Duration,
    subscription: Option<(SubscriptionId, mpsc::Receiver<Message>)>,
    acks: Arc<Acks>,
}

impl MockBackend {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self) -> Result<(), MockError> {
        if !self.async_publish {
            return Ok(self.broker.publish(&self.topic, self.payload.clone()).await?);
        }

        self.acks.pending.fetch_add(1, Ordering::AcqRel);
        let acks = self.acks.clone();
        self.broker
            .publish_async(&self.topic, self.payload.clone(), move |res| {
                if res.is_err() {
                    acks.failed.fetch_add(1, Ordering::Relaxed);
                }
                acks.pending.fetch_sub(1, Ordering::AcqRel);
            });
        Ok(())
    }

    async fn drain_acks(&self) -> Result<(), MockError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            let pending = self.acks.pending.load(Ordering::Acquire);
            if pending == 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(MockError::PendingAcks(pending));
            }
            tokio::time::sleep(ACK_POLL_INTERVAL).await;
        }

        let failed = self.acks.failed.load(Ordering::Relaxed);
        if failed > 0 {
            warn!("{failed} asynchronous publish(es) to {} failed", self.topic);
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    type Error = MockError;

    async fn setup(&mut self) -> Result<(), MockError> {
        self.payload = random_payload(self.payload_size);
        self.broker.create_topic(&self.topic)?;

        if self.consume {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let id = self.broker.subscribe(&self.topic, move |msg: Message| {
                if tx.try_send(msg).is_err() {
                    trace!("Dropping message; consumer is not keeping up");
                }
            })?;
            self.subscription = Some((id, rx));
        }

        debug!("Connected to {}", self.topic);
        Ok(())
    }

    async fn perform_request(&mut self) -> Result<(), MockError> {
        self.publish().await?;

        let Some((_, rx)) = &mut self.subscription else {
            return Ok(());
        };

        match tokio::time::timeout(self.receive_timeout, rx.recv()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(MockError::Closed),
            Err(_) => Err(MockError::Timeout(self.receive_timeout)),
        }
    }

    async fn teardown(&mut self) -> Result<(), MockError> {
        let drained = self.drain_acks().await;

        if let Some((id, _)) = self.subscription.take() {
            self.broker.unsubscribe(&self.topic, id);
        }
        self.broker.delete_topic(&self.topic)?;

        debug!("Disconnected from {}", self.topic);
        drained
    }
}

/// `size` random uppercase ASCII letters.
pub fn random_payload(size: usize) -> Arc<[u8]> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen_range(b'A'..=b'Z')).collect()
}
