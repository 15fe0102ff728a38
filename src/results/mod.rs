//! Run results
//!
//! Aggregation of per-script outcomes and the summary report.

mod stats;

pub use stats::{RunStats, ScriptReport, ScriptStat, StatsSnapshot};
