//! Runtime-free building blocks of `mqbench`.
//!
//! Holds the benchmark configuration, the per-worker latency recorder, the
//! aggregation that turns worker results into a [`Summary`], and the plain-text
//! latency distribution report. Nothing in here spawns tasks or touches a
//! backend; see the `mqbench` crate for the orchestrator.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod aggregate;
mod config;
mod constants;
mod data;
mod report;
mod stats;

pub use aggregate::*;
pub use config::*;
pub use constants::*;
pub use data::*;
pub use report::*;
pub use stats::*;
