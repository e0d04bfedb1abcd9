#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod backend;
mod benchmark;
mod error;
pub mod limiter;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, BackendFactory};
pub use benchmark::{run, run_with_config, Benchmark};
pub use error::{BenchError, BoxError, TeardownError, TeardownFailure};
pub use mqbench_core::{
    nearest_rank, split_quota, BenchmarkConfig, Buckets, ConfigError, LatencyStats, Outcome,
    ReportError, ReportOptions, Sample, StopReason, Summary, WorkerResult,
};

pub mod prelude {
    pub use crate::backend::{Backend, BackendFactory};
    pub use crate::benchmark::{run, run_with_config, Benchmark};
    pub use crate::error::BenchError;
    pub use mqbench_core::{BenchmarkConfig, ReportOptions, Summary};
}
