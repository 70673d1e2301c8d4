//! Stage-level operations built on top of plans and the engine.
//!
//! - [`category`]: equality filter plus a matched/total share report
//! - [`projection`]: in-place reduction of finished files to the minimal columns
//! - [`activity`]: per-day and per-hour averages for the dashboard header

pub mod activity;
pub mod category;
pub mod projection;


pub use activity::{activity_rates, ActivityRates};
pub use category::{count_share, filter_and_report, CategoryReport};
pub use projection::{project_to_minimal, FileOutcome, ProjectionOptimizer, SizeReport};
