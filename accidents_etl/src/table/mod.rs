//! In-memory building blocks shared by the planner and the engine.
//!
//! - [`types`]: column types, cell values and schemas
//! - [`chunk`]: polars helpers for the row batches handed from source to sink
//! - [`temporal`]: per-value timestamp parsing and calendar names

pub mod chunk;
pub mod temporal;
pub mod types;

pub use chunk::CellRenderer;
pub use types::{DataType, Field, Schema, Value};
