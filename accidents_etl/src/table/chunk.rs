//! Polars-backed row chunks.
//!
//! A chunk is a [`DataFrame`] holding at most `chunk_rows` rows. Source
//! columns arrive as strings, parsed timestamps are stored as microsecond
//! `Datetime` columns, and derived components are `Int32` or string columns.
//! The helpers here turn plan-level [`Value`]s into polars literals, masks
//! and fills.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::{
    BooleanChunked, ChunkCompareEq, ChunkFull, Column, DataFrame, DataType as FrameType,
    Float64Chunked, Int32Chunked, Int64Chunked, PlSmallStr, PolarsResult, StringChunked, TimeUnit,
};

use super::temporal;
use super::types::{Schema, Value};

/// Physical type used for every parsed timestamp column.
pub fn timestamp_type() -> FrameType {
    FrameType::Datetime(TimeUnit::Microseconds, None)
}

pub fn is_timestamp(column: &Column) -> bool {
    matches!(column.dtype(), FrameType::Datetime(..))
}

/// Raw source cells. `None` is a null.
pub fn string_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(PlSmallStr::from(name), values)
}

pub fn timestamp_column<I>(name: &str, values: I) -> PolarsResult<Column>
where
    I: IntoIterator<Item = Option<NaiveDateTime>>,
{
    let micros: Vec<Option<i64>> = values
        .into_iter()
        .map(|ts| ts.map(|ts| ts.and_utc().timestamp_micros()))
        .collect();
    Column::new(PlSmallStr::from(name), micros).cast(&timestamp_type())
}

fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Values of a `Datetime` column, nulls included.
pub fn timestamps(column: &Column) -> PolarsResult<Vec<Option<NaiveDateTime>>> {
    let micros = column.cast(&FrameType::Int64)?;
    Ok(micros
        .i64()?
        .into_iter()
        .map(|v| v.and_then(from_micros))
        .collect())
}

/// Lenient per-cell parse of a string column. Unparseable cells become null.
pub fn parse_timestamps(column: &Column) -> PolarsResult<Column> {
    let parsed: Vec<Option<NaiveDateTime>> = column
        .str()?
        .into_iter()
        .map(|raw| raw.and_then(temporal::parse_timestamp))
        .collect();
    timestamp_column(column.name().as_str(), parsed)
}

/// `value` repeated `len` times, in the polars type matching its plan type.
pub fn literal_column(name: &str, value: &Value, len: usize) -> PolarsResult<Column> {
    let label = PlSmallStr::from(name);
    Ok(match value {
        Value::Null => Column::full_null(label, len, &FrameType::String),
        Value::Boolean(b) => Column::new(label, vec![*b; len]),
        Value::Int32(v) => Column::new(label, vec![*v; len]),
        Value::Float64(v) => Column::new(label, vec![*v; len]),
        Value::String(s) => Column::new(label, vec![s.as_str(); len]),
        Value::Timestamp(ts) => return timestamp_column(name, vec![Some(*ts); len]),
    })
}

/// Rows where `column == value`. Null cells are never equal.
pub fn equals_mask(column: &Column, value: &Value) -> PolarsResult<BooleanChunked> {
    let literal = literal_column(column.name().as_str(), value, column.len())?;
    column
        .as_materialized_series()
        .equal(literal.as_materialized_series())
}

/// Rows that are non-null in every one of `names`.
pub fn not_null_mask(frame: &DataFrame, names: &[String]) -> PolarsResult<BooleanChunked> {
    let mut mask = BooleanChunked::full(PlSmallStr::EMPTY, true, frame.height());
    for name in names {
        let present = frame.column(name)?.is_not_null();
        mask = &mask & &present;
    }
    Ok(mask)
}

/// Number of `true` entries in a mask; null entries do not count.
pub fn count_true(mask: &BooleanChunked) -> usize {
    mask.into_iter().filter(|v| *v == Some(true)).count()
}

/// Replace the nulls of `column` with `value`.
pub fn fill_nulls(column: &Column, value: &Value) -> PolarsResult<Column> {
    if column.null_count() == 0 {
        return Ok(column.clone());
    }
    let literal = literal_column(column.name().as_str(), value, column.len())?;
    column.zip_with(&column.is_not_null(), &literal)
}

/// True if the frame's column names match `schema` exactly, in order.
pub fn matches_layout(frame: &DataFrame, schema: &Schema) -> bool {
    frame
        .get_columns()
        .iter()
        .map(|c| c.name().as_str())
        .eq(schema.names())
}

enum Cells {
    Text(StringChunked),
    Int(Int32Chunked),
    Float(Float64Chunked),
    Bool(BooleanChunked),
    Stamp(Int64Chunked),
}

/// Delimited-text view of one column. Nulls render as empty fields.
pub struct CellRenderer {
    cells: Cells,
}

impl CellRenderer {
    pub fn new(column: &Column) -> PolarsResult<Self> {
        let cells = match column.dtype() {
            FrameType::String => Cells::Text(column.str()?.clone()),
            FrameType::Int32 => Cells::Int(column.i32()?.clone()),
            FrameType::Float64 => Cells::Float(column.f64()?.clone()),
            FrameType::Boolean => Cells::Bool(column.bool()?.clone()),
            FrameType::Datetime(..) => Cells::Stamp(column.cast(&FrameType::Int64)?.i64()?.clone()),
            _ => Cells::Text(column.cast(&FrameType::String)?.str()?.clone()),
        };
        Ok(Self { cells })
    }

    pub fn cell(&self, row: usize) -> Cow<'_, str> {
        let value = match &self.cells {
            Cells::Text(ca) => return Cow::Borrowed(ca.get(row).unwrap_or("")),
            Cells::Int(ca) => ca.get(row).map(Value::Int32),
            Cells::Float(ca) => ca.get(row).map(Value::Float64),
            Cells::Bool(ca) => ca.get(row).map(Value::Boolean),
            Cells::Stamp(ca) => ca.get(row).and_then(from_micros).map(Value::Timestamp),
        };
        match value {
            Some(value) => Cow::Owned(value.render().into_owned()),
            None => Cow::Borrowed(""),
        }
    }
}
