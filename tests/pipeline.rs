use std::collections::HashMap;
use std::io::{Cursor, Write};

use one_brc_pipeline::parser::parse_chunk;
use one_brc_pipeline::reader::{BlockReader, Chunk};
use one_brc_pipeline::{AggregateMap, Config, Phase, Pipeline, PipelineError, SourceMode, Stage};
use proptest::prelude::*;
use tempfile::NamedTempFile;

const STATIONS: &[&str] = &["Abha", "Bulawayo", "Hamburg", "Palembang", "St. John's", "Zürich"];

fn write_input(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

fn render(tenths: i64) -> String {
    let sign = if tenths < 0 { "-" } else { "" };
    format!("{sign}{}.{}", tenths.unsigned_abs() / 10, tenths.unsigned_abs() % 10)
}

/// Deterministic pseudo-random measurements; returns the file text and the
/// values observed per station.
fn measurements(rows: usize, seed: u64) -> (Vec<u8>, HashMap<String, Vec<i64>>) {
    let mut state = seed;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state >> 33
    };
    let mut text = Vec::new();
    let mut seen: HashMap<String, Vec<i64>> = HashMap::new();
    for _ in 0..rows {
        let station = STATIONS[next() as usize % STATIONS.len()];
        let value = (next() % 1999) as i64 - 999;
        writeln!(text, "{station};{}", render(value)).unwrap();
        seen.entry(station.to_string()).or_default().push(value);
    }
    (text, seen)
}

fn single_chunk(input: &[u8]) -> AggregateMap {
    let mut map = AggregateMap::new();
    parse_chunk(&Chunk::owned(0, 0, input.to_vec()), &mut map).unwrap();
    map
}

#[test]
fn scenario_from_file() {
    let file = write_input(b"A;3.0\nB;4.0\nA;5.0\n");
    let mut pipeline = Pipeline::new(Config::new(file.path()).with_workers(2));
    let outcome = pipeline.run().unwrap();
    assert_eq!(outcome.report, "{A=3.0/4.0/5.0, B=4.0/4.0/4.0}");
    assert_eq!(pipeline.phase(), Phase::Done);
}

#[test]
fn negative_values() {
    let file = write_input(b"A;-1.0\nA;2.0\n");
    let outcome = Pipeline::new(Config::new(file.path()).with_workers(1))
        .run()
        .unwrap();
    assert_eq!(outcome.report, "{A=-1.0/0.5/2.0}");
}

#[test]
fn summary_matches_observations() {
    let (text, seen) = measurements(5_000, 7);
    let file = write_input(&text);
    let outcome = Pipeline::new(
        Config::new(file.path())
            .with_workers(4)
            .with_block_size(256)
            .with_queue_depth(2),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.stats.records, 5_000);
    assert_eq!(outcome.stats.bytes, text.len() as u64);
    assert_eq!(outcome.summary.len(), seen.len());
    for (station, values) in &seen {
        let stats = outcome.summary.get(station.as_bytes()).unwrap();
        assert_eq!(stats.count, values.len() as u64);
        assert_eq!(stats.sum, values.iter().map(|&v| v as i128).sum::<i128>());
        assert!(values.iter().all(|&v| stats.min <= v && v <= stats.max));
        assert_eq!(stats.min, *values.iter().min().unwrap());
        assert_eq!(stats.max, *values.iter().max().unwrap());
    }
}

#[test]
fn stream_and_mmap_agree() {
    let (text, _) = measurements(2_000, 11);
    let file = write_input(&text);
    let base = Config::new(file.path()).with_workers(3).with_block_size(100);

    let streamed = Pipeline::new(base.clone().with_source(SourceMode::Stream))
        .run()
        .unwrap();
    let mapped = Pipeline::new(base.with_source(SourceMode::Mmap)).run().unwrap();
    assert_eq!(streamed.summary, mapped.summary);
    assert_eq!(streamed.report, mapped.report);
    assert_eq!(mapped.stats.records, 2_000);
}

#[test]
fn overlong_record_fails_in_both_sources() {
    let cases: [(&[u8], u64); 3] = [
        (b"A;1.0\nBBBB;1.0\n", 6),
        (b"A;1.0\nBBBBB;1.0\nC;1.0\nD;1.0\nE;1.0\n", 6),
        (b"A;1.0\nB;1.0\nCCCCCCCC;1.0", 12),
    ];
    for (input, expected_offset) in cases {
        let file = write_input(input);
        for source in [SourceMode::Stream, SourceMode::Mmap] {
            let mut pipeline = Pipeline::new(
                Config::new(file.path())
                    .with_workers(2)
                    .with_block_size(8)
                    .with_source(source),
            );
            match pipeline.run() {
                Err(PipelineError::ChunkBoundary { offset, block_size }) => {
                    assert_eq!((offset, block_size), (expected_offset, 8), "{source:?}");
                }
                other => panic!("{source:?}: expected boundary error, got {other:?}"),
            }
            assert_eq!(pipeline.phase(), Phase::Failed);
        }
    }
}

#[test]
fn tiny_blocks_keep_straddling_records_intact() {
    let input = b"Hamburg;12.0\nBulawayo;8.9\nPalembang;38.8\nHamburg;-2.0\n";
    let mut pipeline = Pipeline::new(Config::new("<memory>").with_workers(2).with_block_size(16));
    let outcome = pipeline.run_reader(Cursor::new(input.to_vec())).unwrap();
    assert_eq!(outcome.stats.records, 4);
    assert_eq!(
        outcome.report,
        "{Bulawayo=8.9/8.9/8.9, Hamburg=-2.0/5.0/12.0, Palembang=38.8/38.8/38.8}"
    );
}

#[test]
fn unterminated_last_record_counts() {
    let file = write_input(b"A;1.0\nA;2.0");
    let outcome = Pipeline::new(Config::new(file.path()).with_workers(2).with_block_size(8))
        .run()
        .unwrap();
    assert_eq!(outcome.report, "{A=1.0/1.5/2.0}");
}

#[test]
fn malformed_record_fails_without_report() {
    let file = write_input(b"A;1.0\nA3.0\nB;2.0\n");
    let mut pipeline = Pipeline::new(Config::new(file.path()).with_workers(2));
    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::MalformedRecord { offset: 6, .. }));
    assert_eq!(err.stage(), Stage::Parser);
    assert_eq!(pipeline.phase(), Phase::Failed);
}

#[test]
fn bad_value_fails_mmap_run() {
    let file = write_input(b"A;1.0\nB;abc\n");
    let mut pipeline = Pipeline::new(
        Config::new(file.path())
            .with_workers(2)
            .with_source(SourceMode::Mmap),
    );
    assert!(matches!(
        pipeline.run(),
        Err(PipelineError::NumericParse { offset: 8, .. })
    ));
    assert_eq!(pipeline.phase(), Phase::Failed);
}

#[test]
fn scan_counts_chunks() {
    let file = write_input(b"A;1.0\nB;2.0\nC;3.0\n");
    let stats = one_brc_pipeline::scan(&Config::new(file.path()).with_block_size(8)).unwrap();
    assert_eq!(stats.bytes, 18);
    assert_eq!(stats.chunks, 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunking_does_not_change_the_summary(
        rows in 1usize..300,
        seed in any::<u64>(),
        block in 32usize..200,
    ) {
        let (text, _) = measurements(rows, seed);
        let whole = single_chunk(&text);

        let mut chunked = AggregateMap::new();
        for chunk in BlockReader::new(Cursor::new(text.clone()), block) {
            let chunk = chunk.unwrap();
            let mut local = AggregateMap::new();
            parse_chunk(&chunk, &mut local).unwrap();
            chunked.merge(local);
        }
        prop_assert_eq!(&whole, &chunked);
    }

    #[test]
    fn worker_count_does_not_change_the_report(seed in any::<u64>(), workers in 1usize..6) {
        let (text, _) = measurements(400, seed);
        let expected = one_brc_pipeline::format_report(&single_chunk(&text));
        let config = Config::new("<memory>")
            .with_workers(workers)
            .with_block_size(64);
        let outcome = Pipeline::new(config)
            .run_reader(Cursor::new(text))
            .unwrap();
        prop_assert_eq!(outcome.report, expected);
    }
}
