use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand_distr::{Distribution, SkewNormal};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, trace, warn};

/// Invoked once per published message for every subscriber of the topic.
pub type Callback = Arc<dyn Fn(Message) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Arc<[u8]>,
    pub published_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("topic {0} does not exist")]
    UnknownTopic(String),

    #[error("topic {0} already exists")]
    TopicExists(String),

    #[error("broker overloaded")]
    Overloaded,
}

/// Delay applied to every publish before the message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Latency {
    #[default]
    None,
    Fixed(Duration),
    /// Skew-normal around `mean`, long tail to the right.
    Jitter { mean: Duration, std: Duration },
}

impl Latency {
    pub fn sample(&self) -> Duration {
        match *self {
            Latency::None => Duration::ZERO,
            Latency::Fixed(latency) => latency,
            Latency::Jitter { mean, std } => {
                let Ok(normal) = SkewNormal::new(mean.as_secs_f64(), std.as_secs_f64(), 20.) else {
                    return mean;
                };
                let v: f64 = normal.sample(&mut rand::thread_rng()).max(0.);
                Duration::try_from_secs_f64(v).unwrap_or(mean)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    pub latency: Latency,
    /// Publishes beyond this rate fail with [`BrokerError::Overloaded`].
    pub max_tps: Option<NonZeroU32>,
    /// Publishes beyond this rate wait for capacity.
    pub limited_tps: Option<NonZeroU32>,
}

impl BrokerOptions {
    pub fn latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    pub fn max_tps(mut self, tps: u32) -> Self {
        self.max_tps = NonZeroU32::new(tps);
        self
    }

    pub fn limited_tps(mut self, tps: u32) -> Self {
        self.limited_tps = NonZeroU32::new(tps);
        self
    }
}

/// In-process pub/sub broker.
///
/// Cheap to clone; clones share topics and limits.
#[derive(Clone, Default)]
pub struct Broker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: RwLock<HashMap<String, Vec<(SubscriptionId, Callback)>>>,
    latency: Latency,
    max_tps: Option<DefaultDirectRateLimiter>,
    limited_tps: Option<DefaultDirectRateLimiter>,
    published: AtomicU64,
    next_subscription: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BrokerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                latency: options.latency,
                max_tps: options.max_tps.map(rate_limiter),
                limited_tps: options.limited_tps.map(rate_limiter),
                ..Default::default()
            }),
        }
    }

    pub fn create_topic(&self, topic: &str) -> Result<(), BrokerError> {
        let mut topics = self
            .inner
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if topics.contains_key(topic) {
            return Err(BrokerError::TopicExists(topic.to_string()));
        }

        debug!("Creating topic {topic}");
        topics.insert(topic.to_string(), vec![]);
        Ok(())
    }

    /// Delete a topic and drop all of its subscriptions.
    pub fn delete_topic(&self, topic: &str) -> Result<(), BrokerError> {
        debug!("Deleting topic {topic}");
        self.inner
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self
            .inner
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    pub fn subscribe<C>(&self, topic: &str, callback: C) -> Result<SubscriptionId, BrokerError>
    where
        C: Fn(Message) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
            .push((id, Arc::new(callback)));
        Ok(id)
    }

    /// Returns false when the subscription (or its topic) no longer exists.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self
            .inner
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Publish and wait until every subscriber has been handed the message.
    pub async fn publish(&self, topic: &str, payload: Arc<[u8]>) -> Result<(), BrokerError> {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        if let Some(limiter) = &self.inner.max_tps {
            if limiter.check().is_err() {
                trace!("Rejecting publish to {topic}");
                return Err(BrokerError::Overloaded);
            }
        }

        if let Some(limiter) = &self.inner.limited_tps {
            limiter.until_ready().await;
        }

        let latency = self.inner.latency.sample();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let subscribers: Vec<Callback> = self
            .inner
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        let message = Message {
            topic: topic.to_string(),
            payload,
            published_at: Instant::now(),
        };
        for callback in subscribers {
            callback(message.clone());
        }

        Ok(())
    }

    /// Publish in the background. `on_ack` runs with the outcome once the
    /// broker is done with the message.
    pub fn publish_async<A>(&self, topic: &str, payload: Arc<[u8]>, on_ack: A)
    where
        A: FnOnce(Result<(), BrokerError>) + Send + 'static,
    {
        let broker = self.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            let res = broker.publish(&topic, payload).await;
            on_ack(res);
        });
    }

    /// Publish attempts so far, including rejected ones.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps))
}
