//! # Accidents ETL
//!
//! Streaming cleanup of the US traffic accidents export into the compact
//! files a dashboard reads.
//!
//! ## Features
//!
//! - **Lazy plans**: immutable, shareable chains of column and row operations
//!   validated against the source header before any row is read
//! - **Chunked execution**: one pass over the source with bounded memory
//! - **Category reports**: filtered subsets together with their share of the table
//! - **Column projection**: in-place reduction of finished files to the
//!   columns downstream consumers need
//!
//! ## Architecture
//!
//! - [`table`]: values, schemas and polars chunk helpers
//! - [`plan`]: the [`LazyTable`](plan::LazyTable) builder
//! - [`engine`]: chunk reader, sinks and [`materialize`](engine::materialize)
//! - [`stages`]: category filter, projection optimizer and activity rates
//! - [`catalog`] / [`config`]: column declarations and file layout
//! - [`pipeline`]: the clean, region and optimize stages wired together

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod stages;
pub mod table;

pub use catalog::{ConsumerContract, SchemaCatalog};
pub use config::PipelineConfig;
pub use error::{EtlError, EtlResult, PlanError, Stage};
pub use pipeline::{InvocationState, Pipeline, RegionOutcome};
