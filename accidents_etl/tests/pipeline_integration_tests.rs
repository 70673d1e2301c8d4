//! End-to-end tests for the clean, region and optimize stages.
//!
//! These tests ensure that:
//! 1. The clean stage drops, filters, derives and fills as configured
//! 2. The region stage writes the matching subset and reports its share
//! 3. The optimize stage projects finished files and is a fixed point
//! 4. Files written by the engine read back with the expected shape

use std::fs;
use std::path::Path;

use polars::prelude::*;
use tempfile::TempDir;

use accidents_etl::stages::FileOutcome;
use accidents_etl::{InvocationState, Pipeline, PipelineConfig};

// ==================== Helper Functions ====================

const RAW_HEADER: &str = "ID,Source,Severity,Start_Time,End_Time,Start_Lat,Start_Lng,End_Lat,End_Lng,\
Description,Street,City,State,Zipcode,Country,Temperature(F),Humidity(%),Wind_Speed(mph),\
Weather_Condition,Sunrise_Sunset,Junction,Crossing,Traffic_Signal,Stop";

/// Six raw rows: one without End_Lat, one without City, one with a broken
/// Start_Time, and three clean ones across CA and OR.
const RAW_ROWS: [&str; 6] = [
    "A-1,S1,2,2016-02-08 05:46:00,2016-02-08 06:16:00,34.1,-118.2,34.2,-118.3,\"Ramp closed, use detour\",Main St,Los Angeles,CA,90001,US,55.0,80.0,,Rain,Night,False,False,True,False",
    "A-2,S1,3,2016-02-09 07:00:00,2016-02-09 07:30:00,34.1,-118.2,,,x,Main St,Los Angeles,CA,90001,US,55.0,80.0,5.0,Clear,Day,False,False,False,False",
    "A-3,S2,2,2016-02-10 08:00:00,2016-02-10 08:45:00,45.5,-122.6,45.6,-122.7,x,Oak Ave,,OR,97201,US,40.0,90.0,3.0,Rain,Day,False,True,False,False",
    "A-4,S2,1,2016-02-11 09:15:00,2016-02-11 10:15:00,45.5,-122.6,45.6,-122.7,x,Oak Ave,Portland,OR,97201,US,42.0,85.0,,Cloudy,Day,True,False,False,True",
    "A-5,S1,4,not recorded,2016-02-12 11:00:00,37.7,-122.4,37.8,-122.5,x,Market St,San Francisco,CA,94103,US,58.0,70.0,12.0,Fog,Day,False,False,True,False",
    "A-6,S3,2,2016-02-20 05:46:00,2016-02-20 06:01:30,32.7,-117.1,32.8,-117.2,x,Harbor Dr,San Diego,CA,92101,US,65.0,60.0,4.0,Clear,Night,False,True,False,False",
];

fn raw_csv() -> String {
    let mut text = String::from(RAW_HEADER);
    text.push('\n');
    for row in RAW_ROWS {
        text.push_str(row);
        text.push('\n');
    }
    text
}

fn config_in(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.raw = dir.join("raw.csv");
    config.paths.cleaned = dir.join("clean.csv");
    config.paths.region = dir.join("ca_only.csv");
    config.paths.optimize = vec![dir.join("ca_only.csv"), dir.join("ca_balanced.csv")];
    config.engine.chunk_rows = 2;
    config
}

fn setup() -> (TempDir, Pipeline) {
    let dir = TempDir::new().expect("create temp dir");
    fs::write(dir.path().join("raw.csv"), raw_csv()).unwrap();
    let pipeline = Pipeline::new(config_in(dir.path()));
    (dir, pipeline)
}

fn read_back(path: &Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.into()))
        .unwrap()
        .finish()
        .unwrap()
}

fn null_count(df: &DataFrame, name: &str) -> usize {
    df.column(name).unwrap().null_count()
}

// ==================== Clean Stage ====================

#[test]
fn clean_stage_filters_and_derives() {
    let (dir, mut pipeline) = setup();
    let report = pipeline.run_clean().unwrap();
    assert_eq!(pipeline.state(), InvocationState::Materialized);

    assert_eq!(report.rows_before, 6);
    assert_eq!(report.rows_after, 4);
    assert_eq!(report.filters.len(), 2);
    assert_eq!(report.filters[0].rows_out, 5);
    assert_eq!(report.filters[1].rows_out, 4);
    assert_eq!(report.chunks, 3);

    let text = fs::read_to_string(dir.path().join("clean.csv")).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "Severity,Start_Time,End_Time,Start_Lat,Start_Lng,End_Lat,End_Lng,Street,City,State,\
         Temperature(F),Humidity(%),Wind_Speed(mph),Weather_Condition,Sunrise_Sunset,Junction,\
         Crossing,Traffic_Signal,Stop,Hour,Month,Weekday,Duration_Minutes"
    );
    let first = text.lines().nth(1).unwrap();
    assert!(first.starts_with("2,2016-02-08 05:46:00,2016-02-08 06:16:00,"));
    assert!(first.ends_with(",5,2,1,30"), "{first}");
}

#[test]
fn clean_output_reads_back_with_planned_shape() {
    let (dir, mut pipeline) = setup();
    let report = pipeline.run_clean().unwrap();
    let planned = pipeline.clean_plan().unwrap();

    let df = read_back(&dir.path().join("clean.csv"));
    assert_eq!(df.height() as u64, report.rows_after);
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let expected: Vec<String> = planned.schema().names().map(str::to_string).collect();
    assert_eq!(names, expected);

    // Null filters hold, the broken timestamp and its derivations are null,
    // and the fill rule leaves no gaps.
    for column in ["End_Lat", "End_Lng", "City", "Street", "Weather_Condition"] {
        assert_eq!(null_count(&df, column), 0, "{column}");
    }
    assert_eq!(null_count(&df, "Start_Time"), 1);
    assert_eq!(null_count(&df, "Hour"), 1);
    assert_eq!(null_count(&df, "Duration_Minutes"), 1);
    assert_eq!(null_count(&df, "Wind_Speed(mph)"), 0);
}

#[test]
fn clean_stage_without_raw_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(config_in(dir.path()));
    let err = pipeline.run_clean().unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("raw.csv"));
    assert!(!dir.path().join("clean.csv").exists());
}

// ==================== Region Stage ====================

#[test]
fn region_stage_keeps_matching_rows_and_reports_share() {
    let (dir, mut pipeline) = setup();
    pipeline.run_clean().unwrap();
    let outcome = pipeline.run_region().unwrap();

    assert_eq!(outcome.share.matched, 3);
    assert_eq!(outcome.share.total, 4);
    assert!((outcome.share.proportion - 0.75).abs() < f64::EPSILON);
    assert_eq!(outcome.run.rows_after, 3);

    let df = read_back(&dir.path().join("ca_only.csv"));
    assert_eq!(df.height(), 3);
    let states = df.column("State").unwrap().str().unwrap();
    assert!(states.into_iter().all(|s| s == Some("CA")));
}

#[test]
fn region_stage_on_empty_table_reports_zero() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    fs::write(&config.paths.cleaned, "Severity,State,Start_Time\n").unwrap();
    let mut pipeline = Pipeline::new(config);

    let outcome = pipeline.run_region().unwrap();
    assert_eq!(
        (outcome.share.matched, outcome.share.total, outcome.share.proportion),
        (0, 0, 0.0)
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("ca_only.csv")).unwrap(),
        "Severity,State,Start_Time\n"
    );
}

// ==================== Optimize Stage ====================

#[test]
fn optimize_stage_projects_and_skips_missing() {
    let (dir, mut pipeline) = setup();
    pipeline.run_clean().unwrap();
    pipeline.run_region().unwrap();

    let outcomes = pipeline.run_optimize();
    assert_eq!(outcomes.len(), 2);
    match &outcomes[0] {
        FileOutcome::Optimized(report) => {
            assert_eq!(report.columns_before, 23);
            assert_eq!(report.columns_after, 12);
            assert_eq!(report.rows, 3);
            assert!(report.bytes_saved() > 0);
        }
        other => panic!("expected ca_only.csv to be optimized, got {other:?}"),
    }
    assert!(matches!(outcomes[1], FileOutcome::Skipped { .. }));

    let text = fs::read_to_string(dir.path().join("ca_only.csv")).unwrap();
    assert_eq!(
        text.lines().next().unwrap(),
        "Severity,Start_Time,Start_Lat,Start_Lng,City,Temperature(F),Humidity(%),\
         Weather_Condition,Junction,Crossing,Traffic_Signal,Stop"
    );
}

#[test]
fn optimize_stage_is_a_fixed_point() {
    let (dir, mut pipeline) = setup();
    pipeline.run_clean().unwrap();
    pipeline.run_region().unwrap();

    pipeline.run_optimize();
    let first = fs::read(dir.path().join("ca_only.csv")).unwrap();
    let outcomes = pipeline.run_optimize();
    let second = fs::read(dir.path().join("ca_only.csv")).unwrap();

    assert_eq!(first, second);
    match &outcomes[0] {
        FileOutcome::Optimized(report) => assert_eq!(report.bytes_saved(), 0),
        other => panic!("unexpected outcome {other:?}"),
    }
}

// ==================== Dashboard Rates ====================

#[test]
fn rates_cover_the_region_file() {
    let (_dir, mut pipeline) = setup();
    pipeline.run_clean().unwrap();
    pipeline.run_region().unwrap();

    let rates = pipeline.run_rates().unwrap();
    assert_eq!(rates.total, 3);
    assert_eq!(rates.days, 12);
    assert!((rates.per_day - 0.25).abs() < 1e-12);
}
