//! Category filter with a share report.

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::{materialize, ExecOptions, MatchCountSink};
use crate::error::{EtlError, EtlResult, Stage};
use crate::plan::{LazyTable, PlanOp};
use crate::table::Value;

/// How much of a table one category value accounts for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub column: String,
    pub value: String,
    pub matched: u64,
    pub total: u64,
    /// `matched / total`, or 0 for an empty table.
    pub proportion: f64,
}

impl CategoryReport {
    fn new(column: &str, value: &Value, matched: u64, total: u64) -> Self {
        let proportion = if total == 0 {
            0.0
        } else {
            matched as f64 / total as f64
        };
        Self {
            column: column.to_string(),
            value: value.to_string(),
            matched,
            total,
            proportion,
        }
    }

    pub fn percent(&self) -> f64 {
        self.proportion * 100.0
    }
}

/// Count the rows of `table` and how many of them the equality filter at
/// the tip of `filtered` keeps, in one streaming pass over `table`.
pub fn count_share(
    table: &LazyTable,
    filtered: &LazyTable,
    options: &ExecOptions,
) -> EtlResult<CategoryReport> {
    let (column, value) = match filtered.op() {
        PlanOp::FilterEquals { column, value } => (column, value),
        other => {
            return Err(EtlError::coercion(
                Stage::Report,
                "",
                format!("expected an equality filter at the plan tip, found {other}"),
            ))
        }
    };

    let mut counter = MatchCountSink::new(column.clone(), value.clone());
    materialize(table, &mut counter, options)?;

    let report = CategoryReport::new(column, value, counter.matched(), counter.total());
    info!(
        "{} == {}: {} of {} rows ({:.2}%)",
        report.column,
        report.value,
        report.matched,
        report.total,
        report.percent()
    );
    Ok(report)
}

/// Restrict `table` to rows where `column == value` and count how many rows
/// that keeps.
///
/// The returned plan is the filtered table, still lazy, ready for further
/// nodes or a terminal materialization. Counting streams the unfiltered table
/// once, keeping both counters in the same pass.
pub fn filter_and_report(
    table: &LazyTable,
    column: &str,
    value: impl Into<Value>,
    options: &ExecOptions,
) -> EtlResult<(LazyTable, CategoryReport)> {
    let filtered = table.filter_equals(column, value)?;
    let report = count_share(table, &filtered, options)?;
    Ok((filtered, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CountSink;
    use crate::error::PlanError;
    use crate::plan::ScanOptions;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("create tmp");
        tmp.write_all(content.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn counts_matches_in_one_pass_and_returns_filtered_plan() {
        let tmp = write_csv("State,City\nCA,LA\nOR,Salem\n,Nowhere\nCA,SF\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();

        let (filtered, report) =
            filter_and_report(&table, "State", "CA", &ExecOptions::default()).unwrap();
        assert_eq!((report.matched, report.total), (2, 4));
        assert!((report.proportion - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.value, "CA");

        let mut sink = CountSink::new();
        materialize(&filtered, &mut sink, &ExecOptions::default()).unwrap();
        assert_eq!(sink.rows(), 2);
    }

    #[test]
    fn empty_table_reports_zero() {
        let tmp = write_csv("State,City\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let (_, report) =
            filter_and_report(&table, "State", "CA", &ExecOptions::default()).unwrap();
        assert_eq!((report.matched, report.total), (0, 0));
        assert_eq!(report.proportion, 0.0);
    }

    #[test]
    fn count_share_needs_an_equality_tip() {
        let tmp = write_csv("State,City\nCA,LA\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let not_equality = table.filter_null_subset(["City"]).unwrap();
        let err = count_share(&table, &not_equality, &ExecOptions::default()).unwrap_err();
        assert!(matches!(err, EtlError::TypeCoercion { .. }));
    }

    #[test]
    fn unknown_column_fails_before_reading() {
        let tmp = write_csv("State,City\nCA,LA\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let err = filter_and_report(&table, "Region", "CA", &ExecOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            EtlError::Plan(PlanError::MissingColumn { .. })
        ));
    }
}
