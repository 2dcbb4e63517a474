use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Reader,
    Parser,
    Merger,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Setup => "setup",
            Stage::Reader => "reader",
            Stage::Parser => "parser",
            Stage::Merger => "merger",
        })
    }
}

/// Every fatal condition the pipeline can hit. None of them are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at byte offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error(
        "record at byte offset {offset} does not fit in the {block_size}-byte block; \
         raise the block size"
    )]
    ChunkBoundary { offset: u64, block_size: usize },

    #[error("malformed record #{record} of chunk {chunk} at byte offset {offset}: {reason}")]
    MalformedRecord {
        offset: u64,
        chunk: u64,
        record: u64,
        reason: &'static str,
    },

    #[error("invalid value {value:?} in record #{record} of chunk {chunk} at byte offset {offset}")]
    NumericParse {
        offset: u64,
        chunk: u64,
        record: u64,
        value: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start the parser pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn the {stage} thread: {source}")]
    Spawn {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("{stage} thread panicked")]
    Panicked { stage: Stage },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Open { .. }
            | PipelineError::InvalidConfig(_)
            | PipelineError::Pool(_) => Stage::Setup,
            PipelineError::Io { .. } | PipelineError::ChunkBoundary { .. } => Stage::Reader,
            PipelineError::MalformedRecord { .. } | PipelineError::NumericParse { .. } => {
                Stage::Parser
            }
            PipelineError::Spawn { stage, .. } | PipelineError::Panicked { stage } => *stage,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
