//! In-place column projection of finished CSV files.
//!
//! Files are read eagerly with polars, restricted to the minimal column set
//! the dashboard needs, and written back to the same path. Every column is
//! read as text so values are copied through verbatim; running the
//! projection twice yields byte-identical files.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use polars::prelude::*;
use serde::Serialize;

use crate::catalog::ConsumerContract;
use crate::engine::source;
use crate::error::{EtlError, EtlResult, Stage};
use crate::plan::SourceSpec;

/// Size and shape of one file before and after projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub path: PathBuf,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub columns_before: usize,
    pub columns_after: usize,
    pub rows: usize,
}

impl SizeReport {
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Result of one file in a batch.
#[derive(Debug)]
pub enum FileOutcome {
    Optimized(SizeReport),
    /// The file did not exist.
    Skipped { path: PathBuf },
    Failed { path: PathBuf, error: EtlError },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Optimized(report) => &report.path,
            FileOutcome::Skipped { path } | FileOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// Projects files onto a fixed list of wanted columns.
#[derive(Debug, Clone)]
pub struct ProjectionOptimizer {
    minimal_columns: Vec<String>,
    contract: Option<ConsumerContract>,
}

impl ProjectionOptimizer {
    pub fn new(minimal_columns: Vec<String>) -> Self {
        Self {
            minimal_columns,
            contract: None,
        }
    }

    /// Refuse to rewrite files whose projection would break `contract`.
    pub fn with_contract(mut self, contract: ConsumerContract) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Rewrite `path` keeping only the wanted columns that its header has,
    /// in header order.
    ///
    /// The file is left untouched when no wanted column is present or when
    /// the consumer contract would be broken.
    pub fn project(&self, path: &Path) -> EtlResult<SizeReport> {
        let spec = SourceSpec {
            path: path.to_path_buf(),
            delimiter: b',',
        };
        let header = source::read_schema_for(&spec, Stage::Optimize)?;
        let keep: Vec<String> = header
            .names()
            .filter(|name| self.minimal_columns.iter().any(|m| m == name))
            .map(str::to_string)
            .collect();

        if keep.is_empty() {
            return Err(EtlError::Contract {
                path: path.to_path_buf(),
                stage: Stage::Optimize,
                reason: "none of the minimal columns are present".to_string(),
            });
        }
        if let Some(contract) = &self.contract {
            if !contract.satisfied_by(&keep) {
                return Err(EtlError::Contract {
                    path: path.to_path_buf(),
                    stage: Stage::Optimize,
                    reason: format!(
                        "projection keeps neither '{}' nor all of [{}]",
                        contract.timestamp_column,
                        contract.derived_columns.join(", ")
                    ),
                });
            }
        }

        let bytes_before = file_size(path)?;
        let frame_err = |e: PolarsError| EtlError::frame(path, Stage::Optimize, e);

        let selection: Arc<[PlSmallStr]> =
            keep.iter().map(|k| PlSmallStr::from(k.as_str())).collect();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_columns(Some(selection))
            .try_into_reader_with_file_path(Some(path.into()))
            .map_err(frame_err)?
            .finish()
            .map_err(frame_err)?;
        let mut df = df.select(keep.iter().map(String::as_str)).map_err(frame_err)?;

        // Staged beside the target, then renamed over it.
        let staging = staging_path(path);
        let written = File::create(&staging)
            .map_err(|e| EtlError::io(&staging, Stage::Optimize, e))
            .and_then(|mut file| {
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(&mut df)
                    .map_err(|e| EtlError::frame(&staging, Stage::Optimize, e))
            });
        if let Err(err) = written {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::rename(&staging, path).map_err(|e| EtlError::io(path, Stage::Optimize, e))?;

        let report = SizeReport {
            path: path.to_path_buf(),
            bytes_before,
            bytes_after: file_size(path)?,
            columns_before: header.len(),
            columns_after: df.width(),
            rows: df.height(),
        };
        info!(
            "projected {}: {} -> {} columns, {} -> {} bytes ({} saved)",
            path.display(),
            report.columns_before,
            report.columns_after,
            report.bytes_before,
            report.bytes_after,
            report.bytes_saved()
        );
        Ok(report)
    }

    /// Project every file in `paths`, one at a time.
    ///
    /// Missing files are skipped and failures are recorded; neither stops the
    /// files after them.
    pub fn optimize_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<FileOutcome> {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                if !path.exists() {
                    warn!("skipping {}: file not found", path.display());
                    return FileOutcome::Skipped {
                        path: path.to_path_buf(),
                    };
                }
                match self.project(path) {
                    Ok(report) => FileOutcome::Optimized(report),
                    Err(err) if err.is_not_found() => {
                        warn!("skipping {}: file disappeared", path.display());
                        FileOutcome::Skipped {
                            path: path.to_path_buf(),
                        }
                    }
                    Err(error) => {
                        warn!("failed to optimize {}: {}", path.display(), error);
                        FileOutcome::Failed {
                            path: path.to_path_buf(),
                            error,
                        }
                    }
                }
            })
            .collect()
    }
}

/// Project a single file onto `minimal_columns` without a consumer contract.
pub fn project_to_minimal(path: &Path, minimal_columns: &[String]) -> EtlResult<SizeReport> {
    ProjectionOptimizer::new(minimal_columns.to_vec()).project(path)
}

fn file_size(path: &Path) -> EtlResult<u64> {
    Ok(fs::metadata(path)
        .map_err(|e| EtlError::io(path, Stage::Optimize, e))?
        .len())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".projecting");
    path.with_file_name(name)
}
