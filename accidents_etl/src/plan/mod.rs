//! Lazy plan construction.
//!
//! - [`lazy`]: the immutable [`LazyTable`] chain and its builder operations
//! - [`expr`]: row-local expressions for derived columns
//!
//! # Example
//!
//! ```no_run
//! use accidents_etl::plan::{DeriveExpr, LazyTable, ScanOptions};
//!
//! # fn example() -> accidents_etl::EtlResult<()> {
//! let raw = LazyTable::scan("us_accidents.csv", &ScanOptions::default())?;
//! let cleaned = raw
//!     .drop(["ID", "Source"])
//!     .parse_timestamp("Start_Time")?
//!     .filter_null_subset(["City"])?
//!     .derive("Hour", DeriveExpr::hour("Start_Time"))?;
//!
//! // `raw` is untouched and can still feed other plans.
//! assert!(raw.schema().contains("ID"));
//! assert!(!cleaned.schema().contains("ID"));
//! # Ok(())
//! # }
//! ```

pub mod expr;
pub mod lazy;


pub use expr::DeriveExpr;
pub use lazy::{LazyTable, PlanNode, PlanOp, ScanOptions, SourceSpec};
