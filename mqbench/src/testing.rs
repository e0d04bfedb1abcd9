//! In-memory backend used by the unit tests.
use crate::backend::{Backend, BackendFactory};
use rand_distr::{Distribution, SkewNormal};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Setup(u64),
    Teardown(u64),
}

#[derive(Debug, Error)]
pub(crate) enum MockError {
    #[error("setup failed")]
    Setup,
    #[error("request failed")]
    Request,
    #[error("teardown failed")]
    Teardown,
}

#[derive(Clone, Default)]
pub(crate) struct MockOptions {
    latency: Duration,
    jitter: Option<Duration>,
    fail_requests: bool,
    fail_setup_on: Option<u64>,
    fail_teardown_on: Option<u64>,
    panic_on: Option<u64>,
    events: Arc<Mutex<Vec<Event>>>,
    requests: Arc<Mutex<BTreeMap<u64, u64>>>,
    issued: Arc<AtomicU64>,
}

impl MockOptions {
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Skew-normal latency around the configured mean.
    pub fn jitter(mut self, std: Duration) -> Self {
        self.jitter = Some(std);
        self
    }

    pub fn fail_requests(mut self) -> Self {
        self.fail_requests = true;
        self
    }

    pub fn fail_setup_on(mut self, connection: u64) -> Self {
        self.fail_setup_on = Some(connection);
        self
    }

    pub fn fail_teardown_on(mut self, connection: u64) -> Self {
        self.fail_teardown_on = Some(connection);
        self
    }

    pub fn panic_on(mut self, connection: u64) -> Self {
        self.panic_on = Some(connection);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Requests issued per connection, as reported at teardown.
    pub fn requests_by_connection(&self) -> BTreeMap<u64, u64> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests issued so far across all connections.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    fn log(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl BackendFactory for MockOptions {
    type Backend = MockBackend;

    fn backend(&self, connection: u64) -> MockBackend {
        MockBackend {
            connection,
            options: self.clone(),
            requests: 0,
        }
    }
}

pub(crate) struct MockBackend {
    connection: u64,
    options: MockOptions,
    requests: u64,
}

impl MockBackend {
    pub fn requests(&self) -> u64 {
        self.requests
    }

    fn sample_latency(&self) -> Duration {
        match self.options.jitter {
            Some(std) => {
                let normal = SkewNormal::new(
                    self.options.latency.as_secs_f64(),
                    std.as_secs_f64(),
                    20.,
                )
                .unwrap();
                let v: f64 = normal.sample(&mut rand::thread_rng()).max(0.);
                Duration::from_secs_f64(v)
            }
            None => self.options.latency,
        }
    }
}

impl Backend for MockBackend {
    type Error = MockError;

    async fn setup(&mut self) -> Result<(), MockError> {
        if self.options.fail_setup_on == Some(self.connection) {
            return Err(MockError::Setup);
        }
        self.options.log(Event::Setup(self.connection));
        Ok(())
    }

    async fn perform_request(&mut self) -> Result<(), MockError> {
        if self.options.panic_on == Some(self.connection) {
            panic!("connection {} panicked", self.connection);
        }

        self.requests += 1;
        self.options.issued.fetch_add(1, Ordering::Relaxed);
        let latency = self.sample_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }

        if self.options.fail_requests {
            Err(MockError::Request)
        } else {
            Ok(())
        }
    }

    async fn teardown(&mut self) -> Result<(), MockError> {
        self.options.log(Event::Teardown(self.connection));
        self.options
            .requests
            .lock()
            .unwrap()
            .insert(self.connection, self.requests);
        if self.options.fail_teardown_on == Some(self.connection) {
            return Err(MockError::Teardown);
        }
        Ok(())
    }
}
