//! End-to-end tests for the batch pipeline.
//!
//! These tests build a realistic source directory of recording units on disk
//! and drive the whole pipeline: validation with ledger write-out, chain
//! merging, per-vehicle analysis and table publication.

use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use water_processor::constants::{
    CONTEXT_FILE, CONTEXT_VERSION_COLUMN, LEDGER_FILE_NAME, MISSION_COLUMN, TABLE_CLEAN_BY_DAY,
    TABLE_CLEAN_BY_RUN, TABLE_GLOBAL, TIME_TABLE_FILE, required_columns,
};
use water_processor::storage::read_table;
use water_processor::{BatchPaths, BatchPipeline, ParquetStore, PipelineConfig};

/// Write one recording-unit directory with a well-formed time table and
/// context file. Gauge values are flat so no tank events fire.
fn write_unit(source: &Path, name: &str, start_time: i64, rows: usize) {
    let dir = source.join(name);
    fs::create_dir_all(&dir).unwrap();

    let mut columns = Vec::new();
    for column in required_columns() {
        let series = match column.as_str() {
            "time" => Series::new(
                "time",
                (0..rows as i64)
                    .map(|i| start_time + i * 1000)
                    .collect::<Vec<_>>(),
            ),
            MISSION_COLUMN => Series::new(MISSION_COLUMN, vec![7i64; rows]),
            name if name.ends_with("IFWTANKCONTENT") => Series::new(name, vec![3.0f64; rows]),
            name => Series::new(name, vec![50.0f64; rows]),
        };
        columns.push(series);
    }
    let mut tt = DataFrame::new(columns).unwrap();
    let file = File::create(dir.join(TIME_TABLE_FILE)).unwrap();
    ParquetWriter::new(file).finish(&mut tt).unwrap();

    let mut ctxt = DataFrame::new(vec![Series::new(
        CONTEXT_VERSION_COLUMN,
        vec!["v1.0.0.91".to_string()],
    )])
    .unwrap();
    let file = File::create(dir.join(CONTEXT_FILE)).unwrap();
    ParquetWriter::new(file).finish(&mut ctxt).unwrap();
}

struct Fixture {
    _dir: TempDir,
    paths: BatchPaths,
    store: Arc<ParquetStore>,
}

/// One vehicle with a two-unit chain, a continuity break, and a unit whose
/// data files are missing.
fn build_fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("Source");
    fs::create_dir_all(&source).unwrap();

    write_unit(&source, "z5500503_20230406_123456_0", 0, 12);
    write_unit(&source, "z5500503_20230406_123456_1", 12_000, 12);
    // Split index jumps to 3: continuity break.
    write_unit(&source, "z5500503_20230406_130000_3", 60_000, 12);
    // Directory present, data files absent.
    fs::create_dir_all(source.join("z5500503_20230406_140000_0")).unwrap();
    // Foreign directory, skipped at discovery.
    fs::create_dir_all(source.join("parquet")).unwrap();

    let paths = BatchPaths::for_source(&source);
    let store = Arc::new(ParquetStore::new(dir.path().join("tables")));
    Fixture {
        _dir: dir,
        paths,
        store,
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::default().with_smoothing_window(3)
}

#[tokio::test]
async fn full_batch_publishes_tables() {
    let fixture = build_fixture();
    let pipeline = BatchPipeline::new(fixture.paths.clone(), config()).unwrap();
    let stats = pipeline
        .process(fixture.store.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.units_seen, 4);
    assert_eq!(stats.units_excluded, 2);
    assert_eq!(stats.runs_merged, 1);
    assert_eq!(stats.vehicles_analysed, 1);

    // The chain merged into one destination pair.
    let merged = fixture
        .paths
        .edited_dir
        .join("z5500503_20230406_123456_0T1");
    assert!(merged.join(TIME_TABLE_FILE).is_file());
    assert!(merged.join(CONTEXT_FILE).is_file());

    // 24 merged rows, minus the boundary row, minus the two rows without a
    // full smoothing window.
    let global = read_table(&fixture.store, TABLE_GLOBAL).unwrap();
    assert_eq!(global.height(), 21);
    assert_eq!(stats.rows_published, 21);
    assert!(global.column("vehicle").is_ok());
    assert!(global.column("day").is_ok());
    assert!(global.column("mission_run").is_ok());
    assert!(global.column("WC_CAR01_LCST_grey_refill_pulse").is_ok());

    // Flat gauges mean no events and zero litre spread.
    let by_run = read_table(&fixture.store, TABLE_CLEAN_BY_RUN).unwrap();
    assert_eq!(by_run.height(), 1);
    let litres = by_run
        .column("litres")
        .unwrap()
        .f64()
        .unwrap()
        .get(0)
        .unwrap();
    assert_eq!(litres, 0.0);

    let by_day = read_table(&fixture.store, TABLE_CLEAN_BY_DAY).unwrap();
    assert_eq!(by_day.height(), 1);
}

#[tokio::test]
async fn ledger_records_both_exclusion_kinds() {
    let fixture = build_fixture();
    let pipeline = BatchPipeline::new(fixture.paths.clone(), config()).unwrap();
    pipeline
        .process(fixture.store.clone(), CancellationToken::new())
        .await
        .unwrap();

    let content = fs::read_to_string(&fixture.paths.ledger_path).unwrap();
    assert!(content.contains("z5500503_20230406_130000_3: continuity"));
    assert!(content.contains("z5500503_20230406_140000_0: missing file(s)"));
    assert!(!content.contains("z5500503_20230406_123456_0:"));
}

#[tokio::test]
async fn validate_only_stops_before_merge() {
    let fixture = build_fixture();
    let pipeline =
        BatchPipeline::new(fixture.paths.clone(), config().with_validate_only()).unwrap();
    let stats = pipeline
        .process(fixture.store.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.units_excluded, 2);
    assert_eq!(stats.runs_merged, 0);
    assert_eq!(stats.rows_published, 0);
    assert!(fixture.paths.ledger_path.is_file());
    assert!(!fixture.paths.edited_dir.exists());
    assert!(!fixture.store.table_path(TABLE_GLOBAL).exists());
}

#[tokio::test]
async fn empty_source_is_a_clean_no_op() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("Source");
    fs::create_dir_all(&source).unwrap();

    let paths = BatchPaths::for_source(&source);
    let store = Arc::new(ParquetStore::new(dir.path().join("tables")));
    let pipeline = BatchPipeline::new(paths, config()).unwrap();
    let stats = pipeline
        .process(store, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.units_seen, 0);
    assert_eq!(stats.rows_published, 0);
}

#[test]
fn ledger_file_name_matches_sibling_layout() {
    let paths = BatchPaths::for_source("/data/Source");
    assert!(paths.ledger_path.ends_with(LEDGER_FILE_NAME));
    assert!(paths.edited_dir.ends_with("Edited"));
}
