//! Chunked reading of delimited sources.

use std::fs::File;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};
use log::debug;
use polars::prelude::DataFrame;

use crate::error::{EtlError, EtlResult, Stage};
use crate::plan::SourceSpec;
use crate::table::chunk::string_column;
use crate::table::{DataType, Field, Schema};

/// Upper bound on per-column preallocation, whatever the chunk size.
const INITIAL_CAPACITY: usize = 8192;

fn open_reader(spec: &SourceSpec, stage: Stage) -> EtlResult<Reader<File>> {
    let file = File::open(&spec.path).map_err(|e| EtlError::io(&spec.path, stage, e))?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .delimiter(spec.delimiter)
        .from_reader(file))
}

fn header_schema(path: &Path, stage: Stage, headers: &StringRecord) -> EtlResult<Schema> {
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(EtlError::SchemaRead {
            path: path.to_path_buf(),
            stage,
            reason: "header row is empty".to_string(),
        });
    }
    let fields = headers
        .iter()
        .map(|name| Field::new(name, DataType::String))
        .collect();
    Schema::try_new(fields).map_err(|duplicate| EtlError::SchemaRead {
        path: path.to_path_buf(),
        stage,
        reason: format!("duplicate column name '{duplicate}'"),
    })
}

/// Read the header of `spec` as an all-string schema.
pub fn read_schema(spec: &SourceSpec) -> EtlResult<Schema> {
    read_schema_for(spec, Stage::Scan)
}

pub(crate) fn read_schema_for(spec: &SourceSpec, stage: Stage) -> EtlResult<Schema> {
    let mut reader = open_reader(spec, stage)?;
    let headers = reader
        .headers()
        .map_err(|e| EtlError::csv(&spec.path, stage, e))?;
    header_schema(&spec.path, stage, headers)
}

/// Streams a source as polars [`DataFrame`]s of at most `chunk_rows` rows.
///
/// Every column is read as strings; an empty field is a null. The delimited
/// reader skips blank lines, which in a one-column source are null rows, so
/// for that layout the skipped lines are counted from the reader's line
/// position and re-emitted as nulls in place.
pub struct ChunkReader {
    reader: Reader<File>,
    names: Vec<String>,
    record: StringRecord,
    chunk_rows: usize,
    spec: SourceSpec,
    /// Line the reader stood on after the previous record.
    line: u64,
    blank_rows: u64,
    held: Option<StringRecord>,
}

impl ChunkReader {
    pub fn open(spec: &SourceSpec, chunk_rows: usize) -> EtlResult<Self> {
        let mut reader = open_reader(spec, Stage::Materialize)?;
        let headers = reader
            .headers()
            .map_err(|e| EtlError::csv(&spec.path, Stage::Materialize, e))?;
        let schema = header_schema(&spec.path, Stage::Materialize, headers)?;
        let names = schema.names().map(str::to_string).collect();
        let line = reader.position().line();

        Ok(Self {
            reader,
            names,
            record: StringRecord::new(),
            chunk_rows: chunk_rows.max(1),
            spec: spec.clone(),
            line,
            blank_rows: 0,
            held: None,
        })
    }

    /// Column names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Blank lines skipped right before the record just read.
    fn skipped_blank_lines(&mut self) -> u64 {
        let now = self.reader.position().line();
        let embedded: usize = self.record.iter().map(|f| f.matches('\n').count()).sum();
        let skipped = now.saturating_sub(self.line + 1 + embedded as u64);
        self.line = now;
        skipped
    }

    /// Read the next chunk, or `None` once the source is exhausted.
    pub fn next_chunk(&mut self) -> EtlResult<Option<DataFrame>> {
        let mut columns: Vec<Vec<Option<String>>> = self
            .names
            .iter()
            .map(|_| Vec::with_capacity(self.chunk_rows.min(INITIAL_CAPACITY)))
            .collect();
        let single_column = self.names.len() == 1;

        let mut rows = 0;
        while rows < self.chunk_rows {
            if self.blank_rows > 0 {
                self.blank_rows -= 1;
                columns[0].push(None);
                rows += 1;
                continue;
            }
            if let Some(record) = self.held.take() {
                push_record(&mut columns, &record);
                rows += 1;
                continue;
            }

            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| EtlError::csv(&self.spec.path, Stage::Materialize, e))?;
            if !more {
                break;
            }
            if single_column {
                self.blank_rows = self.skipped_blank_lines();
                if self.blank_rows > 0 {
                    self.held = Some(self.record.clone());
                    continue;
                }
            }
            push_record(&mut columns, &self.record);
            rows += 1;
        }

        if rows == 0 {
            return Ok(None);
        }

        debug!("read {} rows from {}", rows, self.spec.path.display());
        let columns = self
            .names
            .iter()
            .zip(columns)
            .map(|(name, values)| string_column(name, values))
            .collect();
        DataFrame::new(columns)
            .map(Some)
            .map_err(|e| EtlError::frame(&self.spec.path, Stage::Materialize, e))
    }
}

fn push_record(columns: &mut [Vec<Option<String>>], record: &StringRecord) {
    for (column, field) in columns.iter_mut().zip(record.iter()) {
        column.push((!field.is_empty()).then(|| field.to_string()));
    }
}
