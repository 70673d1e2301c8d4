//! Property tests for filter, category and chunking behavior.

use std::io::Write;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use accidents_etl::engine::{materialize, CountSink, CsvSink, ExecOptions};
use accidents_etl::plan::{LazyTable, ScanOptions};
use accidents_etl::stages::filter_and_report;

fn write_rows(rows: &[(Option<String>, Option<String>)]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create tmp");
    writeln!(tmp, "City,State").unwrap();
    for (city, state) in rows {
        writeln!(
            tmp,
            "{},{}",
            city.as_deref().unwrap_or(""),
            state.as_deref().unwrap_or("")
        )
        .unwrap();
    }
    tmp.flush().unwrap();
    tmp
}

fn cell() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z]{1,8}")
}

fn state() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop_oneof![
        Just("CA".to_string()),
        Just("OR".to_string()),
        Just("WA".to_string()),
    ])
}

fn rows() -> impl Strategy<Value = Vec<(Option<String>, Option<String>)>> {
    prop::collection::vec((cell(), state()), 0..60)
}

// ─────────────────────────────────────────────────────────────────────────────
// Null filtering
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_null_filter_never_adds_rows(rows in rows(), chunk_rows in 1usize..16) {
        let tmp = write_rows(&rows);
        let plan = LazyTable::scan(tmp.path(), &ScanOptions::default())
            .unwrap()
            .filter_null_subset(["City"])
            .unwrap();

        let mut sink = CountSink::new();
        let report = materialize(&plan, &mut sink, &ExecOptions { chunk_rows }).unwrap();

        let non_null = rows.iter().filter(|(city, _)| city.is_some()).count() as u64;
        prop_assert!(report.rows_after <= report.rows_before);
        prop_assert_eq!(report.rows_before, rows.len() as u64);
        prop_assert_eq!(report.rows_after, non_null);
        prop_assert_eq!(report.rows_after == report.rows_before, non_null == rows.len() as u64);
        prop_assert_eq!(sink.rows(), non_null);
    }

    #[test]
    fn prop_output_is_independent_of_chunk_size(rows in rows(), chunk_rows in 1usize..16) {
        let tmp = write_rows(&rows);
        let plan = LazyTable::scan(tmp.path(), &ScanOptions::default())
            .unwrap()
            .filter_null_subset(["State"])
            .unwrap();

        let run = |chunk_rows| {
            let mut sink = CsvSink::from_writer(Vec::new(), "memory");
            materialize(&plan, &mut sink, &ExecOptions { chunk_rows }).unwrap();
            sink.into_inner().unwrap()
        };
        prop_assert_eq!(run(chunk_rows), run(usize::MAX));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Category share
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_proportion_is_matched_over_total(rows in rows()) {
        let tmp = write_rows(&rows);
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let (filtered, report) =
            filter_and_report(&table, "State", "CA", &ExecOptions { chunk_rows: 7 }).unwrap();

        let matched = rows
            .iter()
            .filter(|(_, state)| state.as_deref() == Some("CA"))
            .count() as u64;
        prop_assert_eq!(report.total, rows.len() as u64);
        prop_assert_eq!(report.matched, matched);
        if rows.is_empty() {
            prop_assert_eq!(report.proportion, 0.0);
        } else {
            prop_assert!((report.proportion - matched as f64 / rows.len() as f64).abs() < 1e-12);
        }

        let mut sink = CountSink::new();
        materialize(&filtered, &mut sink, &ExecOptions::default()).unwrap();
        prop_assert_eq!(sink.rows(), matched);
    }
}
