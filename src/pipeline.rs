//! Reader → parser pool → merger → formatter wiring and run lifecycle.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info};

use crate::aggregate::AggregateMap;
use crate::config::{Config, SourceMode};
use crate::error::{PipelineError, Result, Stage};
use crate::format::format_report;
use crate::merger::merge_partials;
use crate::parser::parse_chunk;
use crate::reader::{BlockReader, Chunk, MappedChunks};
use crate::shutdown::Shutdown;

type ChunkSource = Box<dyn Iterator<Item = Result<Chunk>>>;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    /// Reader active, workers consuming.
    Reading,
    /// Reader closed, workers finishing queued chunks.
    Draining,
    /// Workers joined, merger drained.
    Merged,
    Reported,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub chunks: u64,
    pub bytes: u64,
    pub records: u64,
    pub keys: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks={} bytes={} records={} keys={} elapsed={:.2?}",
            self.chunks, self.bytes, self.records, self.keys, self.elapsed
        )
    }
}

/// Successful completion of a run.
#[derive(Debug)]
pub struct Outcome {
    pub report: String,
    pub summary: AggregateMap,
    pub stats: RunStats,
}

pub struct Pipeline {
    config: Config,
    phase: Phase,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            phase: Phase::Init,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Aggregate the configured input file.
    pub fn run(&mut self) -> Result<Outcome> {
        let source = self.config.validate().and_then(|()| open_source(&self.config));
        match source {
            Ok(chunks) => self.run_chunks(chunks),
            Err(e) => {
                advance(&mut self.phase, Phase::Failed);
                Err(e)
            }
        }
    }

    /// Aggregate an arbitrary byte stream with the configured block size.
    pub fn run_reader<R: Read + 'static>(&mut self, reader: R) -> Result<Outcome> {
        if let Err(e) = self.config.validate() {
            advance(&mut self.phase, Phase::Failed);
            return Err(e);
        }
        let chunks = Box::new(BlockReader::new(reader, self.config.block_size));
        self.run_chunks(chunks)
    }

    fn run_chunks(&mut self, chunks: ChunkSource) -> Result<Outcome> {
        let started = Instant::now();
        let result = self.execute(chunks);
        match result {
            Ok((summary, mut stats)) => {
                advance(&mut self.phase, Phase::Merged);
                let report = format_report(&summary);
                advance(&mut self.phase, Phase::Reported);

                stats.keys = summary.len();
                stats.elapsed = started.elapsed();
                info!(%stats, "aggregation complete");
                advance(&mut self.phase, Phase::Done);
                Ok(Outcome {
                    report,
                    summary,
                    stats,
                })
            }
            Err(e) => {
                advance(&mut self.phase, Phase::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self, chunks: ChunkSource) -> Result<(AggregateMap, RunStats)> {
        let workers = self.config.workers;
        info!(
            input = %self.config.input.display(),
            workers,
            block_size = self.config.block_size,
            queue_depth = self.config.chunk_queue_depth(),
            source = ?self.config.source,
            "starting aggregation"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("parser-{i}"))
            .build()?;

        let shutdown = Shutdown::new();
        let records = AtomicU64::new(0);
        let (chunk_tx, chunk_rx) = bounded::<Chunk>(self.config.chunk_queue_depth());
        let (partial_tx, partial_rx) = bounded::<AggregateMap>(workers);
        let phase = &mut self.phase;

        let (fed, merged) = thread::scope(|s| -> Result<_> {
            let merger = thread::Builder::new()
                .name("merger".into())
                .spawn_scoped(s, || merge_partials(partial_rx, &shutdown))
                .map_err(|source| PipelineError::Spawn {
                    stage: Stage::Merger,
                    source,
                })?;

            advance(phase, Phase::Reading);
            let fed = pool.in_place_scope(|scope| {
                for id in 0..workers {
                    let chunks = chunk_rx.clone();
                    let partials = partial_tx.clone();
                    let shutdown = &shutdown;
                    let records = &records;
                    scope.spawn(move |_| parse_worker(id, chunks, partials, shutdown, records));
                }
                // only workers may hold queue ends from here on
                drop(chunk_rx);
                drop(partial_tx);

                let fed = feed(chunks, chunk_tx, &shutdown);
                if !shutdown.is_aborted() {
                    advance(phase, Phase::Draining);
                }
                fed
            });

            let merged = merger.join().unwrap_or_else(|_| {
                shutdown.fail(PipelineError::Panicked {
                    stage: Stage::Merger,
                });
                None
            });
            Ok((fed, merged))
        })?;

        if let Some(err) = shutdown.into_error() {
            return Err(err);
        }
        let summary = merged.ok_or(PipelineError::Panicked {
            stage: Stage::Merger,
        })?;
        let stats = RunStats {
            chunks: fed.0,
            bytes: fed.1,
            records: records.into_inner(),
            ..RunStats::default()
        };
        Ok((summary, stats))
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    debug!(from = ?*phase, to = ?next, "pipeline phase");
    *phase = next;
}

fn open_source(config: &Config) -> Result<ChunkSource> {
    let open_err = |source| PipelineError::Open {
        path: config.input.clone(),
        source,
    };
    let file = File::open(&config.input).map_err(open_err)?;
    let chunks: ChunkSource = match config.source {
        SourceMode::Stream => Box::new(BlockReader::new(file, config.block_size)),
        SourceMode::Mmap => {
            Box::new(MappedChunks::open(&file, config.block_size).map_err(open_err)?)
        }
    };
    Ok(chunks)
}

/// Push chunks onto the queue in file order. Returns (chunks, bytes) sent.
///
/// Dropping `tx` on return is what tells the workers the input is exhausted.
fn feed(chunks: ChunkSource, tx: Sender<Chunk>, shutdown: &Shutdown) -> (u64, u64) {
    let (mut sent, mut bytes) = (0u64, 0u64);
    for chunk in chunks {
        if shutdown.is_aborted() {
            break;
        }
        match chunk {
            Ok(chunk) => {
                debug!(
                    chunk = chunk.index,
                    offset = chunk.offset,
                    len = chunk.len(),
                    "chunk ready"
                );
                let len = chunk.len() as u64;
                if tx.send(chunk).is_err() {
                    // every worker is gone, which only happens on abort
                    break;
                }
                sent += 1;
                bytes += len;
            }
            Err(e) => {
                shutdown.fail(e);
                break;
            }
        }
    }
    (sent, bytes)
}

fn parse_worker(
    id: usize,
    chunks: Receiver<Chunk>,
    partials: Sender<AggregateMap>,
    shutdown: &Shutdown,
    records: &AtomicU64,
) {
    let work = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut local = AggregateMap::new();
        let (mut parsed, mut taken) = (0u64, 0u64);
        for chunk in chunks.iter() {
            if shutdown.is_aborted() {
                return None;
            }
            match parse_chunk(&chunk, &mut local) {
                Ok(n) => parsed += n,
                Err(e) => {
                    shutdown.fail(e);
                    return None;
                }
            }
            taken += 1;
        }
        debug!(
            worker = id,
            chunks = taken,
            records = parsed,
            keys = local.len(),
            "worker finished"
        );
        Some((local, parsed))
    }));

    match work {
        Ok(Some((local, parsed))) if !shutdown.is_aborted() => {
            records.fetch_add(parsed, Ordering::Relaxed);
            // the merger only hangs up after an abort
            let _ = partials.send(local);
        }
        Ok(_) => {}
        Err(_) => shutdown.fail(PipelineError::Panicked {
            stage: Stage::Parser,
        }),
    }
}

/// Outcome of a read-only pass over the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    pub chunks: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Run only the chunk reader over the input, without parsing. Used to measure
/// raw read throughput for a given block size and source mode.
pub fn scan(config: &Config) -> Result<ScanStats> {
    config.validate()?;
    let started = Instant::now();
    let mut stats = ScanStats::default();
    for chunk in open_source(config)? {
        let chunk = chunk?;
        info!(chunk = chunk.index, offset = chunk.offset, len = chunk.len(), "read chunk");
        stats.chunks += 1;
        stats.bytes += chunk.len() as u64;
    }
    stats.elapsed = started.elapsed();
    info!(
        chunks = stats.chunks,
        bytes = stats.bytes,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "scan complete"
    );
    Ok(stats)
}
