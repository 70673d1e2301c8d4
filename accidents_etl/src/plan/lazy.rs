//! Immutable plan chains.
//!
//! A [`LazyTable`] is a handle on the tip of a singly linked chain of
//! [`PlanNode`]s that ends in a source scan. Builder methods never mutate the
//! chain they are called on: each one validates its parameters against the
//! current output schema and returns a new tip that shares every upstream
//! node through `Arc`. Nothing is read beyond the source header until the
//! chain is handed to [`crate::engine::materialize`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::source;
use crate::error::{EtlResult, PlanError};
use crate::table::{DataType, Field, Schema, Value};

use super::expr::DeriveExpr;

/// Where and how a plan reads its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub delimiter: u8,
}

/// Options for opening a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub delimiter: u8,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

/// One operation in a plan chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    Scan(SourceSpec),
    /// Only names that were present upstream are recorded.
    Drop { names: Vec<String> },
    ParseTimestamp { column: String },
    Derive { name: String, expr: DeriveExpr },
    FilterNullSubset { names: Vec<String> },
    FilterEquals { column: String, value: Value },
    FillNull { column: String, default: Value },
}

impl PlanOp {
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            PlanOp::FilterNullSubset { .. } | PlanOp::FilterEquals { .. }
        )
    }
}

impl fmt::Display for PlanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOp::Scan(spec) => write!(f, "scan {}", spec.path.display()),
            PlanOp::Drop { names } => write!(f, "drop [{}]", names.join(", ")),
            PlanOp::ParseTimestamp { column } => write!(f, "parse_timestamp {column}"),
            PlanOp::Derive { name, expr } => write!(f, "derive {name} = {expr}"),
            PlanOp::FilterNullSubset { names } => {
                write!(f, "filter_null_subset [{}]", names.join(", "))
            }
            PlanOp::FilterEquals { column, value } => {
                write!(f, "filter_equals {column} == {value:?}")
            }
            PlanOp::FillNull { column, default } => write!(f, "fill_null {column} <- {default}"),
        }
    }
}

/// A node and the schema it produces.
#[derive(Debug)]
pub struct PlanNode {
    op: PlanOp,
    schema: Schema,
    /// Every name removed by a drop at or above this node.
    dropped: BTreeSet<String>,
    input: Option<Arc<PlanNode>>,
}

impl PlanNode {
    pub fn op(&self) -> &PlanOp {
        &self.op
    }

    /// Output schema of this node.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn dropped(&self) -> &BTreeSet<String> {
        &self.dropped
    }
}

/// Deferred description of a tabular computation.
#[derive(Debug, Clone)]
pub struct LazyTable {
    tip: Arc<PlanNode>,
    source: Arc<SourceSpec>,
}

impl LazyTable {
    /// Open `path` and read its header. No data rows are touched.
    pub fn scan(path: impl AsRef<Path>, options: &ScanOptions) -> EtlResult<Self> {
        let spec = SourceSpec {
            path: path.as_ref().to_path_buf(),
            delimiter: options.delimiter,
        };
        let schema = source::read_schema(&spec)?;
        Ok(Self {
            tip: Arc::new(PlanNode {
                op: PlanOp::Scan(spec.clone()),
                schema,
                dropped: BTreeSet::new(),
                input: None,
            }),
            source: Arc::new(spec),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.tip.schema
    }

    /// Operation at the tip of the chain.
    pub fn op(&self) -> &PlanOp {
        &self.tip.op
    }

    /// Nodes from the source scan to the tip, in execution order.
    pub fn nodes(&self) -> Vec<&PlanNode> {
        let mut nodes = Vec::new();
        let mut cursor = Some(&self.tip);
        while let Some(node) = cursor {
            nodes.push(node.as_ref());
            cursor = node.input.as_ref();
        }
        nodes.reverse();
        nodes
    }

    pub fn source(&self) -> &SourceSpec {
        &self.source
    }

    /// Multi-line rendering of the chain, source first.
    pub fn describe(&self) -> String {
        self.nodes()
            .iter()
            .enumerate()
            .map(|(depth, node)| format!("{depth:>2}: {}", node.op))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&self, op: PlanOp, schema: Schema) -> Self {
        let mut dropped = self.tip.dropped.clone();
        if let PlanOp::Drop { names } = &op {
            dropped.extend(names.iter().cloned());
        }
        Self {
            tip: Arc::new(PlanNode {
                op,
                schema,
                dropped,
                input: Some(Arc::clone(&self.tip)),
            }),
            source: Arc::clone(&self.source),
        }
    }

    /// Remove columns. Names the schema does not have are ignored.
    pub fn drop<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut present: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if self.schema().contains(name) && !present.iter().any(|p| p == name) {
                present.push(name.to_string());
            }
        }
        if present.is_empty() {
            return self.clone();
        }
        let schema = self.schema().without(&present);
        self.push(PlanOp::Drop { names: present }, schema)
    }

    /// Reinterpret a string column as timestamps; unparseable cells become null.
    pub fn parse_timestamp(&self, column: &str) -> Result<Self, PlanError> {
        let field = self.require("parse_timestamp", column)?;
        match field.dtype {
            DataType::String | DataType::Timestamp => {}
            actual => {
                return Err(PlanError::TypeMismatch {
                    node: "parse_timestamp",
                    column: column.to_string(),
                    expected: DataType::String,
                    actual,
                })
            }
        }
        let schema = self.schema().with_type(column, DataType::Timestamp);
        Ok(self.push(
            PlanOp::ParseTimestamp {
                column: column.to_string(),
            },
            schema,
        ))
    }

    /// Append a computed column after every existing column.
    ///
    /// The name must be new to the chain: neither in the current schema nor
    /// removed by an upstream drop.
    pub fn derive(&self, name: &str, expr: DeriveExpr) -> Result<Self, PlanError> {
        if self.schema().contains(name) {
            return Err(PlanError::DuplicateColumn {
                node: "derive",
                column: name.to_string(),
            });
        }
        if self.tip.dropped.contains(name) {
            return Err(PlanError::DroppedColumn {
                node: "derive",
                column: name.to_string(),
            });
        }
        expr.check(self.schema())?;
        let schema = self
            .schema()
            .with_appended(Field::new(name, expr.output_type()));
        Ok(self.push(
            PlanOp::Derive {
                name: name.to_string(),
                expr,
            },
            schema,
        ))
    }

    /// Drop every row that is null in any of `names`.
    pub fn filter_null_subset<I, S>(&self, names: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut subset: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref();
            self.require("filter_null_subset", name)?;
            if !subset.iter().any(|s| s == name) {
                subset.push(name.to_string());
            }
        }
        if subset.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.push(
            PlanOp::FilterNullSubset { names: subset },
            self.schema().clone(),
        ))
    }

    /// Keep rows where `column == value`. Null cells never match.
    pub fn filter_equals(&self, column: &str, value: impl Into<Value>) -> Result<Self, PlanError> {
        let value = self.coerce("filter_equals", column, value.into())?;
        Ok(self.push(
            PlanOp::FilterEquals {
                column: column.to_string(),
                value,
            },
            self.schema().clone(),
        ))
    }

    /// Replace nulls in one column with a fixed default.
    pub fn fill_null(&self, column: &str, default: impl Into<Value>) -> Result<Self, PlanError> {
        let default = self.coerce("fill_null", column, default.into())?;
        Ok(self.push(
            PlanOp::FillNull {
                column: column.to_string(),
                default,
            },
            self.schema().clone(),
        ))
    }

    fn require(&self, node: &'static str, column: &str) -> Result<&Field, PlanError> {
        self.schema()
            .field(column)
            .ok_or_else(|| PlanError::MissingColumn {
                node,
                column: column.to_string(),
            })
    }

    fn coerce(&self, node: &'static str, column: &str, value: Value) -> Result<Value, PlanError> {
        let dtype = self.require(node, column)?.dtype;
        value
            .coerce_to(dtype)
            .ok_or_else(|| PlanError::IncompatibleValue {
                node,
                column: column.to_string(),
                dtype,
                value,
            })
    }
}
