//! Headline activity rates for the dashboard.

use chrono::NaiveDateTime;
use log::{info, warn};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::engine::{materialize, ChunkSink, ExecOptions};
use crate::error::{EtlError, EtlResult, Stage};
use crate::plan::LazyTable;
use crate::table::chunk::timestamps;
use crate::table::{DataType, Schema};

/// Average number of rows per day and per hour over the covered time span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRates {
    pub total: u64,
    /// Whole days between the earliest and latest timestamp, at least 1.
    pub days: u64,
    pub per_day: f64,
    pub per_hour: f64,
}

impl ActivityRates {
    fn empty() -> Self {
        Self {
            total: 0,
            days: 0,
            per_day: 0.0,
            per_hour: 0.0,
        }
    }
}

/// Tracks row count and the earliest and latest value of one timestamp column.
struct SpanSink {
    column: String,
    rows: u64,
    earliest: Option<NaiveDateTime>,
    latest: Option<NaiveDateTime>,
}

impl ChunkSink for SpanSink {
    fn begin(&mut self, schema: &Schema) -> EtlResult<()> {
        match schema.field(&self.column).map(|f| f.dtype) {
            Some(DataType::Timestamp) => Ok(()),
            Some(other) => Err(EtlError::coercion(
                Stage::Report,
                &self.column,
                format!("expected a timestamp column, found {other}"),
            )),
            None => Err(EtlError::coercion(
                Stage::Report,
                &self.column,
                "column is not part of the table",
            )),
        }
    }

    fn write_chunk(&mut self, chunk: &DataFrame) -> EtlResult<()> {
        let column = chunk.column(&self.column).map_err(|_| {
            EtlError::coercion(Stage::Report, &self.column, "column missing from chunk")
        })?;
        let values = timestamps(column)
            .map_err(|e| EtlError::coercion(Stage::Report, &self.column, e.to_string()))?;
        self.rows += chunk.height() as u64;
        for ts in values.into_iter().flatten() {
            self.earliest = Some(self.earliest.map_or(ts, |e| e.min(ts)));
            self.latest = Some(self.latest.map_or(ts, |l| l.max(ts)));
        }
        Ok(())
    }

    fn finish(&mut self) -> EtlResult<u64> {
        Ok(0)
    }
}

/// Stream `table` once and compute per-day and per-hour averages keyed on
/// `timestamp_column`.
///
/// A string column is parsed on the fly. Rows whose timestamp is null still
/// count toward the total but not toward the span. An empty table yields all
/// zeros.
pub fn activity_rates(
    table: &LazyTable,
    timestamp_column: &str,
    options: &ExecOptions,
) -> EtlResult<ActivityRates> {
    let table = match table.schema().field(timestamp_column).map(|f| f.dtype) {
        Some(DataType::String) => table.parse_timestamp(timestamp_column)?,
        _ => table.clone(),
    };

    let mut sink = SpanSink {
        column: timestamp_column.to_string(),
        rows: 0,
        earliest: None,
        latest: None,
    };
    materialize(&table, &mut sink, options)?;

    if sink.rows == 0 {
        warn!(
            "{} has no rows; activity rates default to zero",
            table.source().path.display()
        );
        return Ok(ActivityRates::empty());
    }

    let span_days = match (sink.earliest, sink.latest) {
        (Some(first), Some(last)) => (last - first).num_days().max(0) as u64,
        _ => 0,
    };
    let days = span_days.max(1);
    let rates = ActivityRates {
        total: sink.rows,
        days,
        per_day: sink.rows as f64 / days as f64,
        per_hour: sink.rows as f64 / (days * 24) as f64,
    };
    info!(
        "{} rows over {} days: {:.2}/day, {:.2}/hour",
        rates.total, rates.days, rates.per_day, rates.per_hour
    );
    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn rates_over_a_ten_day_span() {
        let tmp = write_csv(
            "Start_Time,City\n\
             2016-02-01 00:00:00,A\n\
             2016-02-05 12:00:00,B\n\
             ,C\n\
             2016-02-11 00:00:00,D\n",
        );
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let rates = activity_rates(&table, "Start_Time", &ExecOptions { chunk_rows: 2 }).unwrap();
        assert_eq!(rates.total, 4);
        assert_eq!(rates.days, 10);
        assert!((rates.per_day - 0.4).abs() < 1e-12);
        assert!((rates.per_hour - 4.0 / 240.0).abs() < 1e-12);
    }

    #[test]
    fn single_day_span_counts_as_one_day() {
        let tmp = write_csv("Start_Time\n2016-02-01 08:00:00\n2016-02-01 09:00:00\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let rates = activity_rates(&table, "Start_Time", &ExecOptions::default()).unwrap();
        assert_eq!(rates.days, 1);
        assert_eq!(rates.per_day, 2.0);
    }

    #[test]
    fn empty_source_is_all_zero() {
        let tmp = write_csv("Start_Time,City\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        let rates = activity_rates(&table, "Start_Time", &ExecOptions::default()).unwrap();
        assert_eq!(rates, ActivityRates::empty());
    }

    #[test]
    fn unknown_column_is_rejected() {
        let tmp = write_csv("Start_Time\n2016-02-01 08:00:00\n");
        let table = LazyTable::scan(tmp.path(), &ScanOptions::default()).unwrap();
        assert!(activity_rates(&table, "When", &ExecOptions::default()).is_err());
    }
}
