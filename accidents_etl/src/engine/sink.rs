//! Destinations for materialized chunks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use polars::prelude::DataFrame;

use crate::error::{EtlError, EtlResult, Stage};
use crate::table::chunk::{count_true, equals_mask};
use crate::table::{CellRenderer, Schema, Value};

/// Receives the output of a materialization.
///
/// The engine calls [`begin`](ChunkSink::begin) once with the output schema,
/// then [`write_chunk`](ChunkSink::write_chunk) for every transformed chunk
/// in source order, and finally [`finish`](ChunkSink::finish).
pub trait ChunkSink {
    fn begin(&mut self, schema: &Schema) -> EtlResult<()>;

    fn write_chunk(&mut self, chunk: &DataFrame) -> EtlResult<()>;

    /// Flush everything and return the number of bytes emitted.
    fn finish(&mut self) -> EtlResult<u64>;
}

/// `Write` adapter that counts the bytes passing through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Comma-separated UTF-8 output with a header row. Nulls become empty fields.
pub struct CsvSink<W: Write> {
    writer: Writer<CountingWriter<W>>,
    path: PathBuf,
}

impl CsvSink<BufWriter<File>> {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| EtlError::io(path, Stage::Materialize, e))?;
        Ok(Self::from_writer(BufWriter::new(file), path))
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap any writer. `label` only shows up in error messages.
    pub fn from_writer(inner: W, label: impl Into<PathBuf>) -> Self {
        Self {
            writer: WriterBuilder::new()
                .delimiter(b',')
                .from_writer(CountingWriter::new(inner)),
            path: label.into(),
        }
    }

    fn fail(&self, err: csv::Error) -> EtlError {
        EtlError::csv(&self.path, Stage::Materialize, err)
    }

    /// Flush and hand back the wrapped writer.
    pub fn into_inner(self) -> EtlResult<W> {
        let path = self.path;
        self.writer
            .into_inner()
            .map(CountingWriter::into_inner)
            .map_err(|e| EtlError::io(&path, Stage::Materialize, e.into_error()))
    }
}

impl<W: Write> ChunkSink for CsvSink<W> {
    fn begin(&mut self, schema: &Schema) -> EtlResult<()> {
        self.writer
            .write_record(schema.names())
            .map_err(|e| self.fail(e))
    }

    fn write_chunk(&mut self, chunk: &DataFrame) -> EtlResult<()> {
        let columns = chunk
            .get_columns()
            .iter()
            .map(CellRenderer::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EtlError::frame(&self.path, Stage::Materialize, e))?;
        for row in 0..chunk.height() {
            for column in &columns {
                self.writer
                    .write_field(column.cell(row).as_bytes())
                    .map_err(|e| self.fail(e))?;
            }
            self.writer
                .write_record(None::<&[u8]>)
                .map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> EtlResult<u64> {
        self.writer
            .flush()
            .map_err(|e| EtlError::io(&self.path, Stage::Materialize, e))?;
        Ok(self.writer.get_ref().bytes())
    }
}

/// Row-count-only sink.
#[derive(Debug, Default)]
pub struct CountSink {
    rows: u64,
}

impl CountSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl ChunkSink for CountSink {
    fn begin(&mut self, _schema: &Schema) -> EtlResult<()> {
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &DataFrame) -> EtlResult<()> {
        self.rows += chunk.height() as u64;
        Ok(())
    }

    fn finish(&mut self) -> EtlResult<u64> {
        Ok(0)
    }
}

/// Counts all rows and the rows where one column equals a value, in one pass.
#[derive(Debug)]
pub struct MatchCountSink {
    column: String,
    value: Value,
    total: u64,
    matched: u64,
}

impl MatchCountSink {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
            total: 0,
            matched: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn matched(&self) -> u64 {
        self.matched
    }
}

impl ChunkSink for MatchCountSink {
    fn begin(&mut self, schema: &Schema) -> EtlResult<()> {
        if schema.contains(&self.column) {
            Ok(())
        } else {
            Err(EtlError::coercion(
                Stage::Report,
                &self.column,
                "column is not part of the counted table",
            ))
        }
    }

    fn write_chunk(&mut self, chunk: &DataFrame) -> EtlResult<()> {
        let column = chunk.column(&self.column).map_err(|_| {
            EtlError::coercion(Stage::Report, &self.column, "column missing from chunk")
        })?;
        let mask = equals_mask(column, &self.value).map_err(|e| {
            EtlError::coercion(Stage::Report, &self.column, e.to_string())
        })?;
        self.total += chunk.height() as u64;
        self.matched += count_true(&mask) as u64;
        Ok(())
    }

    fn finish(&mut self) -> EtlResult<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::chunk::{string_column, timestamp_column};
    use crate::table::temporal::parse_timestamp;
    use crate::table::{DataType, Field};
    use polars::prelude::{Column, PlSmallStr};

    fn text(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    fn chunk() -> DataFrame {
        DataFrame::new(vec![
            string_column("State", text(&[Some("CA"), None, Some("OR"), Some("CA")])),
            string_column(
                "Description",
                text(&[Some("Lane, blocked"), Some("ok"), None, Some("x")]),
            ),
        ])
        .unwrap()
    }

    fn schema() -> Schema {
        Schema::try_new(vec![
            Field::new("State", DataType::String),
            Field::new("Description", DataType::String),
        ])
        .unwrap()
    }

    #[test]
    fn csv_sink_quotes_and_renders_nulls_empty() {
        let mut sink = CsvSink::from_writer(Vec::new(), "memory");
        sink.begin(&schema()).unwrap();
        sink.write_chunk(&chunk()).unwrap();
        let bytes = sink.finish().unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "State,Description\nCA,\"Lane, blocked\"\n,ok\nOR,\nCA,x\n"
        );
        assert_eq!(bytes, text.len() as u64);
    }

    #[test]
    fn csv_sink_renders_typed_columns() {
        let frame = DataFrame::new(vec![
            timestamp_column(
                "Start_Time",
                vec![parse_timestamp("2016-02-08 05:46:00"), None],
            )
            .unwrap(),
            Column::new(PlSmallStr::from("Hour"), vec![Some(5i32), None]),
            Column::new(PlSmallStr::from("Wind"), vec![Some(0.0f64), Some(2.5)]),
        ])
        .unwrap();
        let schema = Schema::try_new(vec![
            Field::new("Start_Time", DataType::Timestamp),
            Field::new("Hour", DataType::Int32),
            Field::new("Wind", DataType::Float64),
        ])
        .unwrap();

        let mut sink = CsvSink::from_writer(Vec::new(), "memory");
        sink.begin(&schema).unwrap();
        sink.write_chunk(&frame).unwrap();
        sink.finish().unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "Start_Time,Hour,Wind\n2016-02-08 05:46:00,5,0.0\n,,2.5\n");
    }

    #[test]
    fn match_count_sink_ignores_nulls() {
        let mut sink = MatchCountSink::new("State", Value::from("CA"));
        sink.begin(&schema()).unwrap();
        sink.write_chunk(&chunk()).unwrap();
        assert_eq!((sink.matched(), sink.total()), (2, 4));
    }

    #[test]
    fn match_count_sink_rejects_unknown_column() {
        let mut sink = MatchCountSink::new("Region", Value::from("CA"));
        assert!(sink.begin(&schema()).is_err());
    }

    #[test]
    fn count_sink_counts_rows() {
        let mut sink = CountSink::new();
        sink.write_chunk(&chunk()).unwrap();
        sink.write_chunk(&chunk()).unwrap();
        assert_eq!(sink.rows(), 8);
    }
}
