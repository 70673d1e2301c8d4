//! Pipeline configuration file support.
//!
//! Every knob the stages need lives in one [`PipelineConfig`] that is passed
//! in at construction. `Default` reproduces the stock US accidents layout, and
//! a TOML file only has to mention the values it changes:
//!
//! ```toml
//! [paths]
//! raw = "data/US_Accidents_March23.csv"
//!
//! [region]
//! column = "State"
//! value = "OR"
//!
//! [engine]
//! chunk_rows = 100000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{ConsumerContract, SchemaCatalog};
use crate::engine::ExecOptions;
use crate::error::{EtlError, EtlResult};
use crate::plan::{DeriveExpr, ScanOptions};
use crate::table::Value;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub catalog: SchemaCatalog,
    #[serde(default)]
    pub clean: CleanSettings,
    #[serde(default)]
    pub region: RegionSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub consumer: ConsumerContract,
}

/// Input and output files of each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_raw")]
    pub raw: PathBuf,
    #[serde(default = "default_cleaned")]
    pub cleaned: PathBuf,
    #[serde(default = "default_region_output")]
    pub region: PathBuf,
    /// Files rewritten in place by the projection optimizer.
    #[serde(default = "default_optimize_targets")]
    pub optimize: Vec<PathBuf>,
}

fn default_raw() -> PathBuf {
    PathBuf::from("usa_accidents_dataset/US_Accidents_March23.csv")
}

fn default_cleaned() -> PathBuf {
    PathBuf::from("us_accidents_strict_clean.csv")
}

fn default_region_output() -> PathBuf {
    PathBuf::from("us_accidents_ca_only.csv")
}

fn default_optimize_targets() -> Vec<PathBuf> {
    vec![
        PathBuf::from("us_accidents_ca_only.csv"),
        PathBuf::from("us_accidents_ca_balanced.csv"),
    ]
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            cleaned: default_cleaned(),
            region: default_region_output(),
            optimize: default_optimize_targets(),
        }
    }
}

/// A scalar written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Bool(b) => Value::Boolean(*b),
            Literal::Int(i) => i32::try_from(*i)
                .map(Value::Int32)
                .unwrap_or(Value::Float64(*i as f64)),
            Literal::Float(f) => Value::Float64(*f),
            Literal::Text(s) => Value::String(s.clone()),
        }
    }
}

/// One derived column of the clean stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveSpec {
    pub name: String,
    pub expr: DeriveExpr,
}

/// Null replacement applied after filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRule {
    pub column: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSettings {
    #[serde(default = "default_start_column")]
    pub start_column: String,
    #[serde(default = "default_end_column")]
    pub end_column: String,
    #[serde(default = "default_derive")]
    pub derive: Vec<DeriveSpec>,
    #[serde(default = "default_fill")]
    pub fill: Vec<FillRule>,
}

fn default_start_column() -> String {
    "Start_Time".to_string()
}

fn default_end_column() -> String {
    "End_Time".to_string()
}

fn default_derive() -> Vec<DeriveSpec> {
    let start = default_start_column();
    vec![
        DeriveSpec {
            name: "Hour".to_string(),
            expr: DeriveExpr::hour(&start),
        },
        DeriveSpec {
            name: "Month".to_string(),
            expr: DeriveExpr::month(&start),
        },
        DeriveSpec {
            name: "Weekday".to_string(),
            expr: DeriveExpr::weekday(&start),
        },
        DeriveSpec {
            name: "Duration_Minutes".to_string(),
            expr: DeriveExpr::minutes_between(&start, default_end_column()),
        },
    ]
}

fn default_fill() -> Vec<FillRule> {
    vec![FillRule {
        column: "Wind_Speed(mph)".to_string(),
        value: Literal::Float(0.0),
    }]
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self {
            start_column: default_start_column(),
            end_column: default_end_column(),
            derive: default_derive(),
            fill: default_fill(),
        }
    }
}

/// Category kept by the region stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSettings {
    #[serde(default = "default_region_column")]
    pub column: String,
    #[serde(default = "default_region_value")]
    pub value: Literal,
}

fn default_region_column() -> String {
    "State".to_string()
}

fn default_region_value() -> Literal {
    Literal::Text("CA".to_string())
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            column: default_region_column(),
            value: default_region_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_chunk_rows() -> usize {
    ExecOptions::default().chunk_rows
}

fn default_delimiter() -> char {
    ','
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            delimiter: default_delimiter(),
        }
    }
}

impl EngineSettings {
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            chunk_rows: self.chunk_rows.max(1),
        }
    }

    /// Scan options for the configured delimiter, which must be a single ASCII byte.
    pub fn scan_options(&self) -> EtlResult<ScanOptions> {
        if !self.delimiter.is_ascii() {
            return Err(EtlError::Config(format!(
                "delimiter {:?} is not a single ASCII character",
                self.delimiter
            )));
        }
        Ok(ScanOptions {
            delimiter: self.delimiter as u8,
        })
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EtlResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            EtlError::Config(msg) => EtlError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> EtlResult<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("Failed to parse config file: {}", e)))?;
        config.engine.scan_options()?;
        Ok(config)
    }

    /// Load configuration from the first standard location that exists.
    ///
    /// Searches for `accidents_etl.toml` in:
    /// 1. Current directory
    /// 2. `accidents_etl/` directory
    /// 3. Parent directory
    ///
    /// Returns `Ok(None)` when none of them exists.
    pub fn from_default_location() -> EtlResult<Option<Self>> {
        let search_paths = [
            PathBuf::from("accidents_etl.toml"),
            PathBuf::from("accidents_etl/accidents_etl.toml"),
            PathBuf::from("../accidents_etl.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path).map(Some);
            }
        }
        Ok(None)
    }
}
