//! In-process pub/sub broker for exercising `mqbench` without external
//! infrastructure.
//!
//! [`Broker`] can be slowed down with a [`Latency`] profile, capped with
//! `max_tps` (excess publishes fail) or throttled with `limited_tps` (excess
//! publishes wait). [`MockBrokerFactory`] plugs it into a benchmark.
mod adapter;
mod broker;

pub use adapter::*;
pub use broker::*;
