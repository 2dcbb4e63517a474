use std::path::PathBuf;
use std::thread;

use crate::error::{PipelineError, Result};

/// Default read block: large and a power of two.
pub const DEFAULT_BLOCK_SIZE: usize = 32 << 20;

/// How chunks are produced from the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceMode {
    /// Sequential block reads with carry-over between blocks.
    #[default]
    Stream,
    /// Read-only memory map split into block-sized windows.
    Mmap,
}

/// Resolved run configuration. Built once and handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub workers: usize,
    pub block_size: usize,
    pub queue_depth: Option<usize>,
    pub source: SourceMode,
}

impl Config {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            workers: default_workers(),
            block_size: DEFAULT_BLOCK_SIZE,
            queue_depth: None,
            source: SourceMode::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = Some(depth);
        self
    }

    pub fn with_source(mut self, source: SourceMode) -> Self {
        self.source = source;
        self
    }

    /// Capacity of the reader → parser queue. Defaults to one slot per worker.
    pub fn chunk_queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(self.workers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "block size must be at least 1 byte".into(),
            ));
        }
        if self.queue_depth == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "queue depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Available cores minus one (the reader keeps the last one busy), never below one.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::new("measurements.txt");
        assert!(config.workers >= 1);
        assert_eq!(config.block_size, 32 * 1024 * 1024);
        assert_eq!(config.chunk_queue_depth(), config.workers);
        assert_eq!(config.source, SourceMode::Stream);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_values() {
        let base = Config::new("m.txt");
        assert!(matches!(
            base.clone().with_workers(0).validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(base.clone().with_block_size(0).validate().is_err());
        assert!(base.clone().with_queue_depth(0).validate().is_err());
        assert_eq!(base.with_workers(3).with_queue_depth(9).chunk_queue_depth(), 9);
    }
}
