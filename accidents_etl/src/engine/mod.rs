//! Streaming execution.
//!
//! - [`source`]: chunked reading of delimited files
//! - [`sink`]: the [`ChunkSink`] trait and its file, count and match-count sinks
//! - [`executor`]: [`materialize`], the single traversal that runs a plan
//! - [`report`]: the [`RunReport`] produced by every materialization
//!
//! Working memory is bounded by [`ExecOptions::chunk_rows`], never by the size
//! of the source.

pub mod executor;
pub mod report;
pub mod sink;
pub mod source;


pub use executor::{materialize, ExecOptions};
pub use report::{FilterCount, RunReport};
pub use sink::{ChunkSink, CountSink, CountingWriter, CsvSink, MatchCountSink};
pub use source::ChunkReader;
