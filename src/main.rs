use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use one_brc_pipeline::{config, scan, Config, Pipeline, SourceMode, DEFAULT_BLOCK_SIZE};

/// Compute min/mean/max per station over a `station;value` measurements file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Measurements file, one `key;value` record per line.
    #[arg(env = "BRC_INPUT", default_value = "dataset/measurements.txt")]
    input: PathBuf,

    /// Parser threads. Defaults to available cores minus one.
    #[arg(short, long, env = "BRC_WORKERS")]
    workers: Option<usize>,

    /// Read block size in bytes. Must exceed the longest record.
    #[arg(short, long, env = "BRC_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Chunks buffered between the reader and the workers. Defaults to the worker count.
    #[arg(long)]
    queue_depth: Option<usize>,

    #[arg(long, value_enum, default_value_t = SourceMode::Stream)]
    source: SourceMode,

    /// Only read and chunk the input, printing chunk and byte totals.
    #[arg(long)]
    scan_only: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::new(&self.input)
            .with_workers(self.workers.unwrap_or_else(config::default_workers))
            .with_block_size(self.block_size)
            .with_source(self.source);
        if let Some(depth) = self.queue_depth {
            config = config.with_queue_depth(depth);
        }
        config
    }

    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_thread_names(true)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());
    let config = cli.config();

    if cli.scan_only {
        let stats = scan(&config)
            .with_context(|| format!("failed to scan {}", config.input.display()))?;
        println!("chunks={} bytes={}", stats.chunks, stats.bytes);
        return Ok(());
    }

    let mut pipeline = Pipeline::new(config);
    let outcome = pipeline.run().with_context(|| {
        format!(
            "failed to aggregate {}",
            pipeline.config().input.display()
        )
    })?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(outcome.report.as_bytes())
        .and_then(|()| stdout.flush())
        .context("failed to write report")?;
    Ok(())
}
