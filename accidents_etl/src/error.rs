//! Error types for pipeline operations.
//!
//! Two layers are kept apart:
//!
//! - [`PlanError`] is raised while a lazy plan is being built. It never touches
//!   the filesystem and always means the plan itself is inconsistent with its
//!   input schema.
//! - [`EtlError`] is raised by anything that reads or writes data. Every variant
//!   carries the path and the [`Stage`] it came from so that "file missing",
//!   "file corrupt" and "disk full" stay distinguishable in logs.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use polars::error::PolarsError;

use crate::table::{DataType, Value};

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;

/// Pipeline step an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Scan,
    Materialize,
    Report,
    Optimize,
    Config,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scan => "scan",
            Stage::Materialize => "materialize",
            Stage::Report => "report",
            Stage::Optimize => "optimize",
            Stage::Config => "config",
        };
        f.write_str(name)
    }
}

/// Construction-time errors raised by the plan builder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("{node}: column '{column}' not found in input schema")]
    MissingColumn { node: &'static str, column: String },

    #[error("{node}: column '{column}' is {actual}, expected {expected}")]
    TypeMismatch {
        node: &'static str,
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("{node}: column '{column}' already exists")]
    DuplicateColumn { node: &'static str, column: String },

    #[error("{node}: column '{column}' was dropped upstream and cannot be reintroduced")]
    DroppedColumn { node: &'static str, column: String },

    #[error("{node}: value {value:?} cannot be used with column '{column}' of type {dtype}")]
    IncompatibleValue {
        node: &'static str,
        column: String,
        dtype: DataType,
        value: Value,
    },
}

/// Error type for pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("[{stage}] source not found: {}", path.display())]
    SourceNotFound { path: PathBuf, stage: Stage },

    #[error("[{stage}] cannot read table layout of {}: {reason}", path.display())]
    SchemaRead {
        path: PathBuf,
        stage: Stage,
        reason: String,
    },

    #[error("[{stage}] type coercion failed for column '{column}': {reason}")]
    TypeCoercion {
        stage: Stage,
        column: String,
        reason: String,
    },

    #[error("[{stage}] I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("[plan] {0}")]
    Plan(#[from] PlanError),

    #[error("[{stage}] dataframe operation failed on {}: {source}", path.display())]
    Frame {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: PolarsError,
    },

    #[error("[{stage}] {} breaks the consumer contract: {reason}", path.display())]
    Contract {
        path: PathBuf,
        stage: Stage,
        reason: String,
    },

    #[error("[config] {0}")]
    Config(String),
}

impl EtlError {
    /// Wraps an I/O error, promoting `NotFound` to [`EtlError::SourceNotFound`].
    pub fn io(path: &Path, stage: Stage, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return EtlError::SourceNotFound {
                path: path.to_path_buf(),
                stage,
            };
        }
        EtlError::Io {
            path: path.to_path_buf(),
            stage,
            source,
        }
    }

    /// Maps a delimited-text error. Transport failures stay I/O errors; anything
    /// else means the file content could not be decoded.
    pub fn csv(path: &Path, stage: Stage, err: csv::Error) -> Self {
        if err.is_io_error() {
            if let csv::ErrorKind::Io(source) = err.into_kind() {
                return Self::io(path, stage, source);
            }
            return EtlError::SchemaRead {
                path: path.to_path_buf(),
                stage,
                reason: "unknown transport failure".to_string(),
            };
        }
        EtlError::SchemaRead {
            path: path.to_path_buf(),
            stage,
            reason: err.to_string(),
        }
    }

    pub fn frame(path: &Path, stage: Stage, source: PolarsError) -> Self {
        EtlError::Frame {
            path: path.to_path_buf(),
            stage,
            source,
        }
    }

    pub fn coercion(stage: Stage, column: &str, reason: impl Into<String>) -> Self {
        EtlError::TypeCoercion {
            stage,
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error means the input was absent rather than broken.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EtlError::SourceNotFound { .. })
    }
}
