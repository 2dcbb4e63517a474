//! Per-key min/mean/max over large `key;value` files in one parallel pass.
//!
//! The input is cut into record-aligned chunks by a sequential reader,
//! parsed by a fixed pool of workers into private maps, and those maps are
//! folded into one global map by a merger that runs alongside the pool.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod format;
pub mod merger;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod shutdown;

pub use aggregate::{AggregateMap, Stats};
pub use config::{Config, SourceMode, DEFAULT_BLOCK_SIZE};
pub use error::{PipelineError, Stage};
pub use format::format_report;
pub use pipeline::{scan, Outcome, Phase, Pipeline, RunStats, ScanStats};
