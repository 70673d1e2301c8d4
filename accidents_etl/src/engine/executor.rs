//! Single-pass, chunked plan execution.

use std::fs;
use std::path::Path;

use log::{debug, info};
use polars::prelude::{Column, DataFrame, DataType as FrameType, PolarsError};
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult, Stage};
use crate::plan::{LazyTable, PlanOp};
use crate::table::chunk;

use super::report::{FilterCount, RunReport};
use super::sink::ChunkSink;
use super::source::ChunkReader;

/// Execution knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Maximum rows held in memory at once.
    pub chunk_rows: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self { chunk_rows: 50_000 }
    }
}

/// Execute `table` and stream the result into `sink`.
///
/// The source is read `chunk_rows` rows at a time into a polars
/// [`DataFrame`]; each chunk goes through every node in declaration order and
/// is handed to the sink before the next one is read. Row order is preserved.
/// On failure the sink keeps whatever was already written.
pub fn materialize<S>(table: &LazyTable, sink: &mut S, options: &ExecOptions) -> EtlResult<RunReport>
where
    S: ChunkSink + ?Sized,
{
    let source = table.source();
    let bytes_before = fs::metadata(&source.path)
        .map_err(|e| EtlError::io(&source.path, Stage::Materialize, e))?
        .len();

    let nodes = table.nodes();
    let mut report = RunReport {
        bytes_before,
        filters: nodes
            .iter()
            .filter(|node| node.op().is_filter())
            .map(|node| FilterCount {
                node: node.op().to_string(),
                rows_out: 0,
            })
            .collect(),
        ..Default::default()
    };

    let mut reader = ChunkReader::open(source, options.chunk_rows)?;
    sink.begin(table.schema())?;

    while let Some(mut frame) = reader.next_chunk()? {
        report.rows_before += frame.height() as u64;

        let mut filter_slot = 0;
        // Node 0 is the scan that produced the chunk.
        for node in nodes.iter().skip(1) {
            frame = apply(node.op(), frame, &source.path)?;
            if node.op().is_filter() {
                report.filters[filter_slot].rows_out += frame.height() as u64;
                filter_slot += 1;
            }
        }

        if !chunk::matches_layout(&frame, table.schema()) {
            let got: Vec<&str> = frame
                .get_columns()
                .iter()
                .map(|c| c.name().as_str())
                .collect();
            return Err(EtlError::coercion(
                Stage::Materialize,
                got.first().copied().unwrap_or(""),
                format!(
                    "chunk layout [{}] differs from planned schema",
                    got.join(", ")
                ),
            ));
        }

        report.rows_after += frame.height() as u64;
        report.chunks += 1;
        sink.write_chunk(&frame)?;
        debug!(
            "chunk {} done: {} rows kept so far",
            report.chunks, report.rows_after
        );
    }

    report.bytes_after = sink.finish()?;
    info!(
        "materialized {}: {} -> {} rows, {} -> {} bytes",
        source.path.display(),
        report.rows_before,
        report.rows_after,
        report.bytes_before,
        report.bytes_after
    );
    Ok(report)
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> EtlResult<&'a Column> {
    frame.column(name).map_err(|_| {
        EtlError::coercion(Stage::Materialize, name, "column not present at execution time")
    })
}

fn apply(op: &PlanOp, mut frame: DataFrame, path: &Path) -> EtlResult<DataFrame> {
    let failed = |e: PolarsError| EtlError::frame(path, Stage::Materialize, e);
    match op {
        PlanOp::Scan(_) => Ok(frame),
        PlanOp::Drop { names } => Ok(frame.drop_many(names.iter().map(String::as_str))),
        PlanOp::ParseTimestamp { column: name } => {
            let current = column(&frame, name)?;
            if chunk::is_timestamp(current) {
                return Ok(frame);
            }
            if current.dtype() != &FrameType::String {
                return Err(EtlError::coercion(
                    Stage::Materialize,
                    name,
                    format!("cannot parse {} as a timestamp", current.dtype()),
                ));
            }
            let parsed = chunk::parse_timestamps(current).map_err(failed)?;
            frame.with_column(parsed).map_err(failed)?;
            Ok(frame)
        }
        PlanOp::Derive { name, expr } => {
            let derived = expr.evaluate(name, &frame)?;
            frame.with_column(derived).map_err(failed)?;
            Ok(frame)
        }
        PlanOp::FilterNullSubset { names } => {
            for name in names {
                column(&frame, name)?;
            }
            let mask = chunk::not_null_mask(&frame, names).map_err(failed)?;
            frame.filter(&mask).map_err(failed)
        }
        PlanOp::FilterEquals { column: name, value } => {
            let mask = chunk::equals_mask(column(&frame, name)?, value).map_err(failed)?;
            frame.filter(&mask).map_err(failed)
        }
        PlanOp::FillNull { column: name, default } => {
            let filled = chunk::fill_nulls(column(&frame, name)?, default).map_err(failed)?;
            frame.with_column(filled).map_err(failed)?;
            Ok(frame)
        }
    }
}
