//! Contract between the orchestrator and a system under test.
//!
//! Adapters for a specific broker implement [`BackendFactory`] and
//! [`Backend`]. The orchestrator asks the factory for one backend per
//! connection, calls [`Backend::setup`] on each, hands each backend to its own
//! worker for the request loop, and finally calls [`Backend::teardown`].
//! Workers only ever call [`Backend::perform_request`].
use std::error::Error;
use std::future::Future;

/// Produces one [`Backend`] per connection.
pub trait BackendFactory: Send + Sync {
    type Backend: Backend + 'static;

    /// Construct the backend for `connection` (zero-based, unique per worker).
    ///
    /// Must not perform I/O; connecting belongs in [`Backend::setup`]. Adapters
    /// typically derive per-connection resource names from `connection` so
    /// that connections do not share topics, queues or streams.
    fn backend(&self, connection: u64) -> Self::Backend;
}

/// A single connection to the system under test.
///
/// Adapters wrapping blocking client libraries should move those calls onto
/// `tokio::task::spawn_blocking` so that workers keep running in parallel.
pub trait Backend: Send {
    type Error: Error + Send + Sync + 'static;

    /// Establish connections, topics and subscriptions. Called once, before
    /// any request.
    fn setup(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Perform one full request/response (or publish/acknowledge) cycle.
    /// Any failure, including the adapter's own timeout, is an `Err`.
    fn perform_request(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Release everything acquired in `setup`, draining outstanding work.
    /// Called once, after the worker stopped issuing requests.
    fn teardown(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
